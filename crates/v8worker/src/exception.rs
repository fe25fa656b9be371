//! Exception formatting.
//!
//! Turns a caught V8 exception plus its script-origin metadata into the
//! diagnostic text hosts show to developers:
//!
//! ```text
//! code.js:3
//!     throw new Error("boom");
//!     ^^^^^^^^^^^^^^^^^^^^^^^^
//! Error: boom
//!     at code.js:3:5
//! ```
//!
//! Capturing and rendering are split so the rendering can be tested
//! without an engine.

use std::fmt;

use deno_core::error::JsError;
use deno_core::v8;

/// Where in the script an exception was reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOrigin {
    /// Script name given to `load`.
    pub resource_name: String,
    /// 1-based line number.
    pub line_number: usize,
    /// Text of the offending line.
    pub source_line: String,
    /// 0-based start column of the underlined range.
    pub start_column: usize,
    /// 0-based end column (exclusive) of the underlined range.
    pub end_column: usize,
}

/// A captured exception, ready to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionReport {
    /// `String(exception)`.
    pub message: String,
    pub origin: Option<SourceOrigin>,
    pub stack_trace: Option<String>,
}

impl ExceptionReport {
    /// Capture the exception currently held by `tc`.
    pub(crate) fn capture(tc: &mut v8::TryCatch<v8::HandleScope>) -> Self {
        let message = match tc.exception() {
            Some(exception) if !tc.has_terminated() => exception.to_rust_string_lossy(tc),
            _ => "execution terminated".to_string(),
        };

        let origin = tc.message().map(|msg| {
            let resource_name = msg
                .get_script_resource_name(tc)
                .map(|name| name.to_rust_string_lossy(tc))
                .unwrap_or_default();
            let source_line = msg
                .get_source_line(tc)
                .map(|line| line.to_rust_string_lossy(tc))
                .unwrap_or_default();
            SourceOrigin {
                resource_name,
                line_number: msg.get_line_number(tc).unwrap_or(0),
                source_line,
                start_column: msg.get_start_column(),
                end_column: msg.get_end_column(),
            }
        });

        let stack_trace = tc
            .stack_trace()
            .map(|stack| stack.to_rust_string_lossy(tc))
            .filter(|stack| !stack.is_empty());

        Self {
            message,
            origin,
            stack_trace,
        }
    }

    /// Build a report from an error raised while draining the event loop,
    /// such as an unhandled promise rejection.
    pub(crate) fn from_js_error(error: &JsError) -> Self {
        let frame = error
            .source_line_frame_index
            .and_then(|index| error.frames.get(index))
            .or_else(|| error.frames.first());

        let origin = frame.and_then(|frame| {
            frame_origin(
                frame.file_name.as_deref(),
                frame.line_number,
                frame.column_number,
                error.source_line.as_deref(),
            )
        });

        Self {
            message: error.exception_message.clone(),
            origin,
            stack_trace: error.stack.clone().filter(|stack| !stack.is_empty()),
        }
    }

    /// Render the report as diagnostic text.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ExceptionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(origin) = &self.origin else {
            return writeln!(f, "{}", self.message);
        };

        writeln!(f, "{}:{}", origin.resource_name, origin.line_number)?;
        writeln!(f, "{}", origin.source_line)?;

        let width = origin.end_column.saturating_sub(origin.start_column);
        writeln!(
            f,
            "{}{}",
            " ".repeat(origin.start_column),
            "^".repeat(width)
        )?;

        writeln!(f, "{}", self.stack_trace.as_deref().unwrap_or(&self.message))
    }
}

/// Origin for a stack frame. Frame positions are 1-based; the caret
/// covers the single reported column.
fn frame_origin(
    file_name: Option<&str>,
    line_number: Option<i64>,
    column_number: Option<i64>,
    source_line: Option<&str>,
) -> Option<SourceOrigin> {
    let start_column = column_number
        .and_then(|column| usize::try_from(column - 1).ok())
        .unwrap_or(0);
    Some(SourceOrigin {
        resource_name: file_name?.to_string(),
        line_number: usize::try_from(line_number?).ok()?,
        source_line: source_line?.to_string(),
        start_column,
        end_column: start_column + 1,
    })
}
