/// Classification for retry policy.
///
/// Used by the dispatcher to decide whether a failed attempt against a
/// source is worth repeating.
///
/// # Behavior Summary
///
/// | Class | Retry same window? | Counts against attempt budget? |
/// |-------|-------------------|--------------------------------|
/// | `Never` | No | No (fails the window immediately) |
/// | `WithBackoff` | Yes, after an exponential delay | Yes |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Never retry - malformed request, client error, or unparseable payload.
    /// Repeating the same request would produce the same failure.
    Never,

    /// Transient failure such as a timeout, connection reset, 5xx or 429.
    /// Retry with exponential backoff until the attempt budget runs out.
    WithBackoff,
}
