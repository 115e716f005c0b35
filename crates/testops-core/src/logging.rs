//! Subscriber setup for reporters that do not install their own.

use std::fmt;
use tracing::{Event, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

const PREFIX: &str = "[testops]";

/// Installs a stderr subscriber.
///
/// `RUST_LOG` takes precedence; otherwise the level is `info`, or `debug`
/// when `debug` is set. Does nothing if a global subscriber already exists.
pub fn init(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .event_format(PrefixedFormat)
        .try_init();
}

/// `[testops][<time>][<LEVEL>] <target>: <message> <fields>`
struct PrefixedFormat;

impl<S, N> FormatEvent<S, N> for PrefixedFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(
            writer,
            "{}[{}][{}] {}: ",
            PREFIX,
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            metadata.level(),
            metadata.target()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
