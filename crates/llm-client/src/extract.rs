use serde_json::Value;

/// Pulls a JSON object out of raw model output.
///
/// Models wrap JSON in prose, markdown fences and stray commas. The pipeline:
/// strip code fences, slice from the first `{` to the last `}`, normalize
/// trailing commas and empty values, then parse. Returns `None` when nothing
/// salvageable remains; the caller applies its schema fallback.
pub fn extract_json(raw: &str) -> Option<Value> {
    let without_fences = strip_code_fences(raw);

    let start = without_fences.find('{')?;
    let end = without_fences.rfind('}')?;
    if end <= start {
        return None;
    }
    let candidate = &without_fences[start..=end];

    if let Ok(value) = serde_json::from_str::<Value>(candidate) {
        return value.is_object().then_some(value);
    }

    let normalized = normalize(candidate);
    serde_json::from_str::<Value>(&normalized)
        .ok()
        .filter(|v| v.is_object())
}

fn strip_code_fences(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Repairs the common structural slips: trailing commas before a closing
/// bracket, and `"key": ,` / `"key": }` empty-value patterns (replaced with
/// null). String literals pass through untouched.
fn normalize(candidate: &str) -> String {
    let mut out = String::with_capacity(candidate.len());
    let chars: Vec<char> = candidate.chars().collect();
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                // Drop the comma when the next significant char closes a scope.
                match next_significant(&chars, i + 1) {
                    Some('}') | Some(']') => {}
                    _ => out.push(c),
                }
            }
            ':' => {
                out.push(c);
                // An empty value slot becomes null.
                if matches!(next_significant(&chars, i + 1), Some(',') | Some('}')) {
                    out.push_str(" null");
                }
            }
            _ => out.push(c),
        }
        i += 1;
    }

    out
}

fn next_significant(chars: &[char], from: usize) -> Option<char> {
    chars[from..].iter().copied().find(|c| !c.is_whitespace())
}
