use crate::error::{ResolveError, Result};
use crate::model::{MediaFile, SelectionCriteria};

/// Select the single best rendition for a playback context.
///
/// MIME type is a hard-preference filter with graceful fallback, bandwidth
/// is a soft ceiling, and dimension match is the primary ranking signal:
/// playable-format correctness matters most, then respecting the viewer's
/// likely connection quality, then visual fit. Ties on dimension score go
/// to the higher bitrate, then to the earliest-declared candidate, making
/// the selection deterministic and idempotent.
///
/// Fails with [`ResolveError::NoCandidates`] only when `candidates` is
/// empty; every filter falls back rather than rejecting the whole set.
pub fn choose_best<'a>(
    candidates: &'a [MediaFile],
    criteria: &SelectionCriteria,
) -> Result<&'a MediaFile> {
    if candidates.is_empty() {
        return Err(ResolveError::NoCandidates);
    }

    let all: Vec<&MediaFile> = candidates.iter().collect();

    let mime_filtered = match &criteria.supported_mime_types {
        Some(mime_types) => {
            let kept: Vec<&MediaFile> = all
                .iter()
                .copied()
                .filter(|file| {
                    mime_types
                        .iter()
                        .any(|mime| mime.eq_ignore_ascii_case(&file.mime_type))
                })
                .collect();
            if kept.is_empty() { all } else { kept }
        }
        None => all,
    };

    let ceiling = criteria.bandwidth_ceiling_kbs.unwrap_or(0.0);
    let surviving = if ceiling > 0.0 {
        let kept: Vec<&MediaFile> = mime_filtered
            .iter()
            .copied()
            .filter(|file| {
                file.bitrate_kbs
                    .is_none_or(|bitrate| f64::from(bitrate) <= ceiling)
            })
            .collect();
        if kept.is_empty() { mime_filtered } else { kept }
    } else {
        mime_filtered
    };

    // min_by keeps the first of equal elements, so declaration order is the
    // final tie-break
    surviving
        .into_iter()
        .min_by(|a, b| {
            dimension_score(a, criteria)
                .cmp(&dimension_score(b, criteria))
                .then_with(|| b.bitrate_kbs.cmp(&a.bitrate_kbs))
        })
        .ok_or(ResolveError::NoCandidates)
}

/// Squared pixel distance between a rendition and the viewport; lower is a
/// better visual fit
fn dimension_score(file: &MediaFile, criteria: &SelectionCriteria) -> i64 {
    let dw = i64::from(file.width) - i64::from(criteria.viewport_width);
    let dh = i64::from(file.height) - i64::from(criteria.viewport_height);
    dw * dw + dh * dh
}
