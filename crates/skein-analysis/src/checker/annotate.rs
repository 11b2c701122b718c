//! Rendering annotated sources.

use super::analyze::Annotation;

/// Insert every annotation into `src`.
///
/// Positions are 0-based line and byte column. Annotations pointing past
/// the end of a line or of the source are dropped.
pub fn render(src: &str, annotations: &[Annotation]) -> String {
    let line_starts: Vec<usize> = std::iter::once(0)
        .chain(src.match_indices('\n').map(|(i, _)| i + 1))
        .collect();

    let mut inserts: Vec<(usize, &str)> = annotations
        .iter()
        .filter_map(|a| {
            let start = *line_starts.get(a.at.line as usize)?;
            let offset = start + a.at.column as usize;
            let line_end = src[start..].find('\n').map_or(src.len(), |n| start + n);
            (offset <= line_end && src.is_char_boundary(offset)).then_some((offset, a.text.as_str()))
        })
        .collect();
    inserts.sort_by_key(|(offset, _)| *offset);

    let extra: usize = inserts.iter().map(|(_, text)| text.len()).sum();
    let mut out = String::with_capacity(src.len() + extra);
    let mut cursor = 0;
    for (offset, text) in inserts {
        out.push_str(&src[cursor..offset]);
        out.push_str(text);
        cursor = offset;
    }
    out.push_str(&src[cursor..]);
    out
}
