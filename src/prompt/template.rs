//! Chat prompt templates with f-string style `{variable}` substitution

use std::collections::HashMap;
use crate::Result;
use crate::agent::Message;
use crate::error::Error;

/// Variables the executor fills itself, never supplied by callers
const SCRATCHPAD: &str = "agent_scratchpad";
const CHAT_HISTORY: &str = "chat_history";

/// One entry of a chat prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptPart {
    System(String),
    Human(String),
    Ai(String),
    /// Slot for a list of messages supplied at format time
    Placeholder { variable: String, optional: bool },
}

/// A chat prompt pulled from the registry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptTemplate {
    parts: Vec<PromptPart>,
    partials: HashMap<String, String>,
}

impl PromptTemplate {
    pub fn new(parts: Vec<PromptPart>) -> Self {
        Self { parts, partials: HashMap::new() }
    }

    pub fn parts(&self) -> &[PromptPart] {
        &self.parts
    }

    /// Bind a variable ahead of time
    pub fn partial(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.partials.insert(name.into(), value.into());
        self
    }

    /// Variables still needed at format time
    pub fn input_variables(&self) -> Vec<String> {
        let mut vars = Vec::new();
        for part in &self.parts {
            let names = match part {
                PromptPart::System(t) | PromptPart::Human(t) | PromptPart::Ai(t) => {
                    variables(t).unwrap_or_default()
                }
                PromptPart::Placeholder { variable, optional: false } if variable != SCRATCHPAD => {
                    vec![variable.clone()]
                }
                PromptPart::Placeholder { .. } => vec![],
            };
            for name in names {
                if !self.partials.contains_key(&name) && !vars.contains(&name) {
                    vars.push(name);
                }
            }
        }
        vars
    }

    /// Render the prompt for one user input
    ///
    /// The scratchpad and optional chat history render empty: the executor
    /// appends its own tool exchange after the rendered prompt.
    pub fn format(&self, input: &str) -> Result<Vec<Message>> {
        let mut values: HashMap<&str, &str> = self.partials
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        values.insert("input", input);

        let mut messages = Vec::with_capacity(self.parts.len());
        for part in &self.parts {
            match part {
                PromptPart::System(t) => messages.push(Message::system(substitute(t, &values)?)),
                PromptPart::Human(t) => messages.push(Message::user(substitute(t, &values)?)),
                PromptPart::Ai(t) => messages.push(Message::assistant(substitute(t, &values)?)),
                PromptPart::Placeholder { variable, optional } => {
                    if !optional && variable != SCRATCHPAD && variable != CHAT_HISTORY {
                        return Err(Error::Template(format!(
                            "required message placeholder '{}' has no value",
                            variable
                        )));
                    }
                }
            }
        }
        Ok(messages)
    }
}

/// Names referenced by `{name}` in a template
fn variables(template: &str) -> Result<Vec<String>> {
    let mut names = Vec::new();
    scan(template, |name| {
        names.push(name.to_string());
        Ok(String::new())
    })?;
    Ok(names)
}

fn substitute(template: &str, values: &HashMap<&str, &str>) -> Result<String> {
    scan(template, |name| {
        values
            .get(name)
            .map(|v| v.to_string())
            .ok_or_else(|| Error::Template(format!("missing value for variable '{}'", name)))
    })
}

/// Walk an f-string template, resolving each `{name}` through `resolve`
///
/// `{{` and `}}` are literal braces.
fn scan<F>(template: &str, mut resolve: F) -> Result<String>
where
    F: FnMut(&str) -> Result<String>,
{
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => name.push(ch),
                        None => {
                            return Err(Error::Template(format!(
                                "unclosed '{{' in template: {}",
                                template
                            )))
                        }
                    }
                }
                out.push_str(&resolve(name.trim())?);
            }
            '}' => {
                return Err(Error::Template(format!("single '}}' in template: {}", template)));
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Role;

    fn functions_template() -> PromptTemplate {
        PromptTemplate::new(vec![
            PromptPart::System("{instructions}".to_string()),
            PromptPart::Placeholder { variable: "chat_history".to_string(), optional: true },
            PromptPart::Human("{input}".to_string()),
            PromptPart::Placeholder { variable: "agent_scratchpad".to_string(), optional: false },
        ])
    }

    #[test]
    fn test_partial_then_format() {
        let prompt = functions_template().partial("instructions", "Be brief.");
        assert_eq!(prompt.input_variables(), vec!["input"]);

        let messages = prompt.format("Any mail from Amy?").unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, "Be brief.");
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].content, "Any mail from Amy?");
    }

    #[test]
    fn test_missing_partial_is_template_error() {
        let err = functions_template().format("hi").unwrap_err();
        assert!(matches!(err, Error::Template(ref m) if m.contains("instructions")));
    }

    #[test]
    fn test_escaped_braces_and_input_with_braces() {
        let prompt = PromptTemplate::new(vec![PromptPart::Human("{{json}} {input}".to_string())]);
        let messages = prompt.format("{not a var}").unwrap();
        assert_eq!(messages[0].content, "{json} {not a var}");
    }

    #[test]
    fn test_malformed_templates() {
        for bad in ["{unclosed", "stray } brace"] {
            let prompt = PromptTemplate::new(vec![PromptPart::System(bad.to_string())]);
            assert!(prompt.format("x").is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_required_unknown_placeholder_rejected() {
        let prompt = PromptTemplate::new(vec![PromptPart::Placeholder {
            variable: "examples".to_string(),
            optional: false,
        }]);
        assert_eq!(prompt.input_variables(), vec!["examples"]);
        assert!(prompt.format("x").is_err());
    }
}
