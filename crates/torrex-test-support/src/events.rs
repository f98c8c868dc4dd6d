//! Event bus helpers for async tests.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use torrex_events::{Event, EventStream};

/// Default wait applied by [`next_event`].
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// Next event on `stream`, failing after [`EVENT_TIMEOUT`].
///
/// # Errors
///
/// Returns an error on timeout or when the bus is closed.
pub async fn next_event(stream: &mut EventStream) -> Result<Event> {
    let envelope = tokio::time::timeout(EVENT_TIMEOUT, stream.next())
        .await
        .context("timed out waiting for event")?
        .ok_or_else(|| anyhow!("event stream closed"))?;
    Ok(envelope.event)
}

/// Skip events until one satisfies `matches`.
///
/// # Errors
///
/// Returns an error on timeout or when the bus is closed.
pub async fn wait_for_event<F>(stream: &mut EventStream, mut matches: F) -> Result<Event>
where
    F: FnMut(&Event) -> bool,
{
    loop {
        let event = next_event(stream).await?;
        if matches(&event) {
            return Ok(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use torrex_events::EventBus;

    #[tokio::test]
    async fn wait_for_event_skips_unrelated_events() -> Result<()> {
        let bus = EventBus::new();
        let mut stream = bus.subscribe(None);
        let _ = bus.publish(Event::AlertsReady);
        let _ = bus.publish(Event::ListenStateChanged { listening: true });
        let event = wait_for_event(&mut stream, |event| {
            matches!(event, Event::ListenStateChanged { .. })
        })
        .await?;
        assert_eq!(event, Event::ListenStateChanged { listening: true });
        Ok(())
    }
}
