///
/// Shared support for the cothread integration tests.
///
/// Set `COTHREAD_TEST_VERBOSE=1` to see progress messages and the library's
/// own trace output.
///

use std::fmt::Display;
use std::sync::Once;

use cothread::{Config, Runtime};

static LOGGING: Once = Once::new();

pub fn setup() -> Runtime {
    LOGGING.call_once(|| {
        if std::env::var_os("COTHREAD_TEST_VERBOSE").is_some() {
            let _ = tracing_subscriber::fmt()
                .with_test_writer()
                .with_max_level(tracing::Level::TRACE)
                .with_thread_names(true)
                .try_init();
        }
    });
    Runtime::init(Config::default()).expect("Failed to initialize runtime")
}

pub fn info_msg(msg: impl Display) {
    tracing::info!("{}", msg);
}
