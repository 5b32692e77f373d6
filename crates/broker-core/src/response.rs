//! Stable, ordered response composition.
//!
//! Sections are appended in a fixed order regardless of the order they are
//! set in: scope warning, closed-console messages, all-pipes status,
//! busy-sibling lines, cached sibling outputs, primary payload, optional
//! hint. Empty sections are skipped; non-empty sections are joined by a
//! single blank line. No trailing whitespace is stripped.

#[derive(Debug, Default)]
pub struct ResponseBuilder {
    scope_warning: Option<String>,
    closed_console_messages: Vec<String>,
    all_pipes_status: Option<String>,
    busy_lines: Option<String>,
    cached_outputs: Option<String>,
    primary: Option<String>,
    hint: Option<String>,
}

impl ResponseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope_warning(mut self, text: impl Into<String>) -> Self {
        self.scope_warning = Some(text.into());
        self
    }

    pub fn closed_console_messages(mut self, messages: Vec<String>) -> Self {
        self.closed_console_messages = messages;
        self
    }

    pub fn all_pipes_status(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        if !text.is_empty() {
            self.all_pipes_status = Some(text);
        }
        self
    }

    pub fn busy_lines(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        if !text.is_empty() {
            self.busy_lines = Some(text);
        }
        self
    }

    pub fn cached_outputs(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        if !text.is_empty() {
            self.cached_outputs = Some(text);
        }
        self
    }

    pub fn primary(mut self, text: impl Into<String>) -> Self {
        self.primary = Some(text.into());
        self
    }

    pub fn hint(mut self, text: impl Into<String>) -> Self {
        self.hint = Some(text.into());
        self
    }

    pub fn build(self) -> String {
        let closed = if self.closed_console_messages.is_empty() {
            None
        } else {
            Some(self.closed_console_messages.join("\n"))
        };

        let sections = [
            self.scope_warning,
            closed,
            self.all_pipes_status,
            self.busy_lines,
            self.cached_outputs,
            self.primary,
            self.hint,
        ];

        sections
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
