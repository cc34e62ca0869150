//! Structured logging for `Db`'s operation boundary.
//!
//! A single `init` entry point selecting a [`Profile`], canonical
//! `log_op_start!`/`log_op_end!`/`log_op_error!` macros using the field names
//! in `tridb_core_types::log_fields`, and a test-capture mode for asserting
//! on emitted events without a real subscriber.

use std::sync::Once;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

/// Which subscriber `init` installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Human-readable output for development.
    Development,
    /// JSON structured output for production.
    Production,
    /// No-op registry; pair with [`init_test_capture`] for assertions.
    Test,
}

static INIT_ONCE: Once = Once::new();

/// Install a global `tracing` subscriber for `profile`. Safe to call more
/// than once; only the first call takes effect.
pub fn init(profile: Profile) {
    INIT_ONCE.call_once(|| match profile {
        Profile::Development => {
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tridb=debug")))
                .init();
        }
        Profile::Production => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tridb=info")))
                .init();
        }
        Profile::Test => {
            tracing_subscriber::registry().init();
        }
    });
}

/// Log the start of an operation.
#[macro_export]
macro_rules! log_op_start {
    ($op:expr) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = tridb_core_types::log_fields::EVENT_START,
        );
    };
    ($op:expr, $($field:tt)*) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = tridb_core_types::log_fields::EVENT_START,
            $($field)*
        );
    };
}

/// Log the successful end of an operation.
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, duration_ms = $duration:expr) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = tridb_core_types::log_fields::EVENT_END,
            duration_ms = $duration,
        );
    };
    ($op:expr, duration_ms = $duration:expr, $($field:tt)*) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = tridb_core_types::log_fields::EVENT_END,
            duration_ms = $duration,
            $($field)*
        );
    };
}

/// Log an operation's failure. `$err` must be a `&tridb_errors::TdbError`.
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, duration_ms = $duration:expr) => {
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = tridb_core_types::log_fields::EVENT_END_ERROR,
            duration_ms = $duration,
            err_kind = ?$err.kind(),
            err_code = $err.code(),
        );
    };
}

pub mod test_capture {
    //! Test-only subscriber that captures emitted events in memory, for
    //! asserting on what an operation logged without a real backend.

    use std::collections::HashMap;
    use std::sync::{Arc, Mutex, OnceLock};
    use tracing::field::Visit;
    use tracing::{Level, Subscriber};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::registry::LookupSpan;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::Layer;

    #[derive(Clone, Debug)]
    pub struct CapturedEvent {
        pub level: Level,
        pub op: Option<String>,
        pub event: Option<String>,
        pub fields: HashMap<String, String>,
    }

    struct FieldVisitor {
        fields: HashMap<String, String>,
    }

    impl Visit for FieldVisitor {
        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            self.fields.insert(field.name().to_string(), format!("{:?}", value));
        }

        fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
            self.fields.insert(field.name().to_string(), value.to_string());
        }

        fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
            self.fields.insert(field.name().to_string(), value.to_string());
        }

        fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
            self.fields.insert(field.name().to_string(), value.to_string());
        }
    }

    struct TestCaptureLayer {
        events: Arc<Mutex<Vec<CapturedEvent>>>,
    }

    impl<S> Layer<S> for TestCaptureLayer
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            let metadata = event.metadata();
            let mut visitor = FieldVisitor { fields: HashMap::new() };
            event.record(&mut visitor);
            let captured = CapturedEvent {
                level: *metadata.level(),
                op: visitor.fields.get("op").cloned(),
                event: visitor.fields.get("event").cloned(),
                fields: visitor.fields,
            };
            self.events.lock().map(|mut events| events.push(captured)).ok();
        }
    }

    /// Handle for reading back captured events in a test.
    #[derive(Clone)]
    pub struct TestCapture {
        events: Arc<Mutex<Vec<CapturedEvent>>>,
    }

    impl TestCapture {
        pub fn events(&self) -> Vec<CapturedEvent> {
            self.events.lock().map(|e| e.clone()).unwrap_or_default()
        }

        /// # Panics
        /// Panics if no captured event has this `op`/`event` pair.
        pub fn assert_event_exists(&self, op: &str, event: &str) {
            let events = self.events();
            let found = events.iter().any(|e| e.op.as_deref() == Some(op) && e.event.as_deref() == Some(event));
            assert!(found, "expected op={op} event={event} not found in {} captured events", events.len());
        }

        pub fn clear(&self) {
            self.events.lock().map(|mut e| e.clear()).ok();
        }
    }

    static GLOBAL_CAPTURE: OnceLock<TestCapture> = OnceLock::new();

    /// Install the capture subscriber (idempotent) and return the shared handle.
    pub fn init_test_capture() -> TestCapture {
        GLOBAL_CAPTURE
            .get_or_init(|| {
                let events = Arc::new(Mutex::new(Vec::new()));
                let layer = TestCaptureLayer { events: events.clone() };
                tracing_subscriber::registry().with(layer).init();
                TestCapture { events }
            })
            .clone()
    }
}
