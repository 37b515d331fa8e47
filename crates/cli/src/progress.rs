use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};
use ppnet_align_analysis::{AnalysisEvent, AnalysisObserver};
use tracing::debug;

const TEMPLATE: &str = "{msg} [{bar:30.cyan/blue}] {pos}/{len} ({elapsed})";

/// One progress bar per ranking, like the per-class loops of the report.
#[derive(Default)]
pub struct ProgressObserver {
    bar: Mutex<Option<ProgressBar>>,
}

impl AnalysisObserver for ProgressObserver {
    fn on_event(&self, event: &AnalysisEvent) {
        debug!("{event}");
        let Ok(mut slot) = self.bar.lock() else {
            return;
        };
        match event {
            AnalysisEvent::RankingStarted { scope, prototypes } => {
                let bar = ProgressBar::new(*prototypes as u64);
                if let Ok(style) = ProgressStyle::with_template(TEMPLATE) {
                    bar.set_style(style.progress_chars("=> "));
                }
                bar.set_message(format!("Computing {scope}"));
                if let Some(previous) = slot.replace(bar) {
                    previous.finish_and_clear();
                }
            }
            AnalysisEvent::PrototypeRendered { .. } => {
                if let Some(bar) = slot.as_ref() {
                    bar.inc(1);
                }
            }
            AnalysisEvent::RankingFinished { .. } => {
                if let Some(bar) = slot.take() {
                    bar.finish();
                }
            }
            _ => {}
        }
    }
}
