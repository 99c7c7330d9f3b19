//! Integration coverage for domain primitives and spans.

use codesearch_domain::{ChunkSpan, CodebaseId, CollectionName, LineSpan, PrimitiveError};
use codesearch_shared::{ErrorEnvelope, Result};
use std::path::Path;

#[test]
fn chunk_span_rejects_inverted_bounds() {
    let error = ChunkSpan::new(5, 2).err();
    assert!(matches!(
        error,
        Some(PrimitiveError::SpanStartAfterEnd { .. })
    ));

    let envelope: ErrorEnvelope = error.expect("inverted span must error").into();
    assert_eq!(envelope.code.namespace(), "domain");
    assert_eq!(envelope.code.code(), "invalid_span");
}

#[test]
fn line_span_rejects_non_positive_and_inverted_bounds() {
    let non_positive = LineSpan::new(0, 1).err();
    assert!(matches!(
        non_positive,
        Some(PrimitiveError::LineSpanNonPositive { .. })
    ));

    let inverted = LineSpan::new(3, 1).err();
    assert!(matches!(
        inverted,
        Some(PrimitiveError::LineSpanStartAfterEnd { .. })
    ));
}

#[test]
fn chunk_span_round_trips_into_one_indexed_line_span() -> Result<()> {
    let span = ChunkSpan::new(0, 4).map_err(ErrorEnvelope::from)?;
    let line_span = span.to_line_span().map_err(ErrorEnvelope::from)?;
    assert_eq!(line_span.start_line(), 1);
    assert_eq!(line_span.end_line(), 5);
    Ok(())
}

#[test]
fn collection_name_rejects_blank_input() {
    let Err(error) = CollectionName::new("   ") else {
        unreachable!("blank collection names must be rejected");
    };
    assert_eq!(error.code.code(), "invalid_input");
}

#[test]
fn codebase_id_normalizes_separators_across_platforms() {
    let unix = CodebaseId::derive(Path::new("/home/user/project"));
    let windows = CodebaseId::derive(Path::new("\\home\\user\\project"));
    assert_eq!(unix, windows);
}
