//! Test-only tracing-subscriber bootstrap. A library never installs a
//! global subscriber on behalf of its embedder; this exists purely so the
//! integration test suite gets readable output, the way the teacher's own
//! tests pull in `tracing-subscriber` as a dev-dependency.

use std::sync::Once;

static INIT: Once = Once::new();

/// Installs an env-filtered, test-writer tracing subscriber exactly once
/// per process. Safe to call from every test; later calls are no-ops.
pub fn init_for_tests() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}
