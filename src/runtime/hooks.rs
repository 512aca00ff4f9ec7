/// Outcome of a user-supplied fetch or commit hook raced against cancellation.
pub(crate) enum HookDecision<T> {
    Finished(anyhow::Result<T>),
    Cancelled,
}
