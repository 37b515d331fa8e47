use std::{fmt::Write as _, fs, path::Path};

use anyhow::{Context, Result};

/// Fields shared by both `info.txt` flavours.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrototypeFacts {
    pub index: usize,
    /// Class recorded for the prototype at push time.
    pub class: usize,
    /// Class the prototype connects to most strongly in the last layer.
    pub strongest_class: usize,
    pub activation: f32,
}

/// Report for a prototype ranked over the whole network.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalPrototypeReport {
    pub facts: PrototypeFacts,
    /// Last-layer weight into the predicted class.
    pub predicted_class_weight: f32,
}

/// Report for a prototype ranked within one of the top classes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassPrototypeReport {
    pub facts: PrototypeFacts,
    pub class_logit: f32,
    /// Last-layer weight into the ranked class.
    pub class_weight: f32,
}

fn write_connection(out: &mut String, facts: &PrototypeFacts) {
    if facts.strongest_class != facts.class {
        let _ = writeln!(out, "prototype connection: {}", facts.strongest_class);
    }
}

impl GlobalPrototypeReport {
    pub fn render(&self) -> String {
        let facts = &self.facts;
        let mut out = String::new();
        let _ = writeln!(out, "prototype index: {}", facts.index);
        let _ = writeln!(out, "prototype class: {}", facts.class);
        write_connection(&mut out, facts);
        let _ = writeln!(
            out,
            "activation value (similarity score): {:.4}",
            facts.activation
        );
        let _ = writeln!(
            out,
            "last layer connection with predicted class: {:.4}",
            self.predicted_class_weight
        );
        out
    }
}

impl ClassPrototypeReport {
    pub fn render(&self) -> String {
        let facts = &self.facts;
        let mut out = String::new();
        let _ = writeln!(out, "prototype index: {}", facts.index);
        let _ = writeln!(out, "prototype class: {}", facts.class);
        let _ = writeln!(out, "prototype class logits: {:.4}", self.class_logit);
        write_connection(&mut out, facts);
        let _ = writeln!(
            out,
            "activation value (similarity score): {:.4}",
            facts.activation
        );
        let _ = writeln!(out, "last layer connection: {:.4}", self.class_weight);
        out
    }
}

pub fn write_info(dir: &Path, contents: &str) -> Result<()> {
    let path = dir.join("info.txt");
    fs::write(&path, contents).with_context(|| format!("failed to write {}", path.display()))
}
