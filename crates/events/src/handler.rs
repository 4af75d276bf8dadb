/// Execute an aggregate command in memory (no IO, no persistence).
///
/// Decides events with `handle`, then applies each of them. Used by domain
/// tests and by callers that rehydrate an aggregate and want to preview the
/// outcome of a command. For persisted execution use the infra
/// `CommandDispatcher`.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: stockhold_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
