use serde_json::Value;

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        self == OutputFormat::Json
    }
}

/// Trait for formatting CLI output
///
/// Human output goes to stdout with status marks; JSON output prints only
/// documents on stdout so it can be piped.
pub trait OutputFormatter {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    /// A heading followed by indented `info` lines
    fn section(&self, title: &str);
    fn print_json(&self, value: &Value);
}

/// Human-readable output formatter with checkmarks and indentation
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn success(&self, message: &str) {
        println!("\u{2713} {message}");
    }
    fn error(&self, message: &str) {
        eprintln!("\u{2717} Error: {message}");
    }
    fn warn(&self, message: &str) {
        eprintln!("\u{26a0} Warning: {message}");
    }
    fn info(&self, message: &str) {
        println!("  {message}");
    }
    fn section(&self, title: &str) {
        println!();
        println!("{title}");
    }
    fn print_json(&self, _value: &Value) {}
}

/// JSON output formatter
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn success(&self, _message: &str) {}
    fn error(&self, message: &str) {
        eprintln!("{}", serde_json::json!({"success": false, "error": message}));
    }
    fn warn(&self, message: &str) {
        eprintln!("{}", serde_json::json!({"level": "warning", "message": message}));
    }
    fn info(&self, _message: &str) {}
    fn section(&self, _title: &str) {}
    fn print_json(&self, value: &Value) {
        println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Human => Box::new(HumanFormatter),
    }
}
