//! Logging setup per platform: os_log plus `<data_dir>/estate.log` on iOS,
//! logcat on Android, stderr elsewhere. Installed once by `EstateApp::new()`;
//! later calls are no-ops.

#[cfg(any(target_os = "ios", target_os = "android"))]
const MOBILE_FILTER: &str = "estate_core=debug,estate_rtdb_store=info,estate_memory_store=info,info";

pub fn init_logging(#[allow(unused)] data_dir: &str) {
    #[cfg(target_os = "ios")]
    {
        use tracing_subscriber::prelude::*;

        let _ = tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::new(MOBILE_FILTER))
            .with(tracing_oslog::OsLogger::new("com.estate.app", "default"))
            .with(log_file_layer(data_dir))
            .try_init();
    }

    #[cfg(target_os = "android")]
    {
        use tracing_subscriber::prelude::*;

        let logcat = paranoid_android::layer("estate")
            .with_filter(tracing_subscriber::EnvFilter::new(MOBILE_FILTER));
        let _ = tracing_subscriber::registry().with(logcat).try_init();
    }

    #[cfg(not(any(target_os = "ios", target_os = "android")))]
    {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "estate_core=debug,info".into()),
            )
            .try_init();
    }
}

/// Plain-text log inside the app container, readable from the simulator
/// filesystem when os_log filtering hides entries.
#[cfg(target_os = "ios")]
fn log_file_layer<S>(data_dir: &str) -> Option<impl tracing_subscriber::Layer<S>>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let _ = std::fs::create_dir_all(data_dir);
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(std::path::Path::new(data_dir).join("estate.log"))
        .ok()?;
    Some(
        tracing_subscriber::fmt::layer()
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .with_target(true),
    )
}
