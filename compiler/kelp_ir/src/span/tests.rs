use super::*;

#[test]
fn length_and_emptiness() {
    let span = Span::new(10, 24);
    assert_eq!(span.len(), 14);
    assert!(!span.is_empty());
    assert!(Span::DUMMY.is_empty());
}

#[test]
fn merge_covers_both() {
    let merged = Span::new(10, 20).merge(Span::new(4, 12));
    assert_eq!(merged, Span::new(4, 20));
}

#[test]
fn displays_as_range() {
    assert_eq!(Span::new(3, 9).to_string(), "3..9");
}
