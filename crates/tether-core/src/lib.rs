// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use tracing_subscriber::{fmt, EnvFilter};

/// Directive used when `RUST_LOG` is unset or unparsable.
///
/// Validation messages pass at every level; the debug messenger's own
/// severity mask decides which ones are produced.
pub const DEFAULT_DIRECTIVE: &str = "info,tether::validation=trace";

fn filter(from_env: Option<&str>) -> EnvFilter {
    from_env
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Install the global subscriber. Safe to call more than once.
pub fn init_tracing() {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let _ = fmt()
        .with_env_filter(filter(env.as_deref()))
        .with_target(false)
        .compact()
        .try_init();
    tracing::debug!("tracing initialised");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use tracing::{Event, Subscriber};
    use tracing_subscriber::{
        layer::{Context, SubscriberExt},
        Layer,
    };

    #[test]
    fn falls_back_to_default_directive() {
        assert_eq!(filter(None).to_string(), EnvFilter::new(DEFAULT_DIRECTIVE).to_string());
        assert_eq!(
            filter(Some("tether=loudest")).to_string(),
            EnvFilter::new(DEFAULT_DIRECTIVE).to_string()
        );
    }

    #[test]
    fn env_directive_wins() {
        assert_eq!(filter(Some("trace")).to_string(), "trace");
    }

    #[derive(Clone, Default)]
    struct Counter(Arc<AtomicUsize>);

    impl<S: Subscriber> Layer<S> for Counter {
        fn on_event(&self, _: &Event<'_>, _: Context<'_, S>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn default_filter_passes_every_validation_level() {
        let counter = Counter::default();
        let subscriber = tracing_subscriber::registry()
            .with(filter(None))
            .with(counter.clone());
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "tether::validation", "info from the layer");
            tracing::trace!(target: "tether::validation", "verbose from the layer");
            tracing::debug!(target: "tether_app", "not shown by default");
        });
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn repeated_init_is_harmless() {
        init_tracing();
        init_tracing();
    }
}
