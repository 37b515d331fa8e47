use ppnet_align_core::{
    ClassIdentity, ClassWeights, check_alignment, distinct_classes,
    alignment::{ALIGNED_MESSAGE, MISALIGNED_MESSAGE},
};

#[test]
fn identical_assignments_are_aligned() {
    let report = check_alignment(&[0, 0, 1, 1, 2], &[0, 0, 1, 1, 2]);
    assert!(report.is_aligned());
    assert_eq!(report.message(), ALIGNED_MESSAGE);
    assert!(report.mismatched.is_empty());
}

#[test]
fn single_mismatch_warns() {
    let report = check_alignment(&[0, 0, 1, 2, 2], &[0, 0, 1, 1, 2]);
    assert!(!report.is_aligned());
    assert_eq!(report.message(), MISALIGNED_MESSAGE);
    assert_eq!(report.mismatched, vec![3]);
    assert_eq!(report.aligned, 4);
    assert_eq!(report.to_string(), MISALIGNED_MESSAGE);
}

#[test]
fn length_mismatch_is_never_aligned() {
    let report = check_alignment(&[0, 1], &[0, 1, 1]);
    assert!(!report.is_aligned());
    assert_eq!(report.total, 3);
}

#[test]
fn strongest_connection_matches_identity_for_standard_init() {
    // Training initialises the last layer with 1 for own class and -0.5 elsewhere.
    let identity = ClassIdentity::evenly_partitioned(6, 3).unwrap();
    let mut weights = Vec::new();
    for class in 0..3 {
        for prototype in 0..6 {
            weights.push(if identity.get(prototype, class) == 1.0 { 1.0 } else { -0.5 });
        }
    }
    let weights = ClassWeights::from_vec(3, 6, weights).unwrap();
    let strongest = weights.strongest_classes();
    assert_eq!(strongest, vec![0, 0, 1, 1, 2, 2]);
    assert!(check_alignment(&strongest, &[0, 0, 1, 1, 2, 2]).is_aligned());
    assert_eq!(distinct_classes(&strongest), 3);
}

#[test]
fn class_mask_follows_identity() {
    let identity = ClassIdentity::evenly_partitioned(4, 2).unwrap();
    assert_eq!(identity.class_mask(0), vec![true, true, false, false]);
    assert_eq!(identity.class_mask(1), vec![false, false, true, true]);
    assert_eq!(identity.class_mask(5), vec![false; 4]);
}
