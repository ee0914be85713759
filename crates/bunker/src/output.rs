use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Human,
    /// One JSON object per line on stdout, errors on stderr.
    Json,
}

/// Renders command results and signer stream events.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    format: Format,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum Reply<'a, T: Serialize> {
    Ok { command: &'a str, data: T },
    Error { error: &'a str },
}

#[derive(Serialize)]
struct StreamEvent<'a, T: Serialize> {
    event: &'a str,
    #[serde(flatten)]
    data: T,
}

impl Output {
    pub fn new(json: bool) -> Self {
        let format = if json { Format::Json } else { Format::Human };
        Self { format }
    }

    pub fn success<T: Serialize>(&self, command: &str, data: T) {
        match self.format {
            Format::Json => println!("{}", to_line(&Reply::Ok { command, data })),
            Format::Human => println!("{}", human(&data)),
        }
    }

    pub fn success_message(&self, command: &str, message: &str) {
        match self.format {
            Format::Json => println!(
                "{}",
                to_line(&Reply::Ok {
                    command,
                    data: serde_json::json!({ "message": message }),
                })
            ),
            Format::Human => println!("{}", message),
        }
    }

    pub fn error(&self, message: &str) {
        match self.format {
            Format::Json => {
                let reply: Reply<()> = Reply::Error { error: message };
                eprintln!("{}", to_line(&reply));
            }
            Format::Human => eprintln!("Error: {}", message),
        }
    }

    pub fn event<T: Serialize>(&self, event_type: &str, data: T) {
        match self.format {
            Format::Json => println!(
                "{}",
                to_line(&StreamEvent {
                    event: event_type,
                    data,
                })
            ),
            Format::Human => println!("[{}] {}", event_type, to_line(&data)),
        }
    }
}

fn to_line<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
}

/// Top-level object fields as `key: value` lines; anything else as compact JSON.
fn human<T: Serialize>(data: &T) -> String {
    match serde_json::to_value(data) {
        Ok(Value::Object(fields)) => fields
            .iter()
            .map(|(key, value)| match value {
                Value::String(s) => format!("{}: {}", key, s),
                Value::Null => format!("{}: -", key),
                Value::Array(items) if items.is_empty() => format!("{}: (none)", key),
                Value::Array(items) => {
                    let lines: Vec<String> = items
                        .iter()
                        .map(|item| match item {
                            Value::String(s) => format!("  {}", s),
                            other => format!("  {}", other),
                        })
                        .collect();
                    format!("{}:\n{}", key, lines.join("\n"))
                }
                other => format!("{}: {}", key, other),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Ok(other) => other.to_string(),
        Err(e) => format!("(unprintable: {})", e),
    }
}
