/// Derive a kilobits-per-second estimate from one completed fetch.
///
/// Each fetch simply overwrites the running estimate; wrapper hops differ
/// wildly in payload size, so no smoothing is applied across them. A zero
/// elapsed time leaves the previous estimate unchanged.
pub fn estimate_kbs(payload_bytes: u64, elapsed_ms: u64, previous_kbs: f64) -> f64 {
    if elapsed_ms == 0 {
        return previous_kbs;
    }

    let kilobits = payload_bytes as f64 * 8.0 / 1000.0;
    let seconds = elapsed_ms as f64 / 1000.0;
    kilobits / seconds
}
