//! Line framing for the wire protocol: `<id> <COMMAND> [name=value]*`
//! requests and `<id> <completed 0|1> <errorCode> [name=value]*`
//! responses, grounded on `server.c`'s `sendResult`/`parseCommand` pair
//! (`String_format(result,"%d %d %d ",id,completeFlag,errorCode)` plus
//! a whitespace/quote tokenizer for arguments).

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::error::{BarError, Result};

/// A single `name=value` argument. Values are either bare tokens or
/// single-quoted strings with backslash escapes; this type always
/// stores the decoded value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub name: String,
    pub value: String,
}

/// A parsed request line: `<id> <COMMAND> [name=value]*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub id: u64,
    pub command: String,
    pub arguments: Vec<Argument>,
}

impl Request {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.arguments.iter().find(|a| a.name == name).map(|a| a.value.as_str())
    }

    pub fn encode(&self) -> String {
        let mut line = format!("{} {}", self.id, self.command);
        for arg in &self.arguments {
            let _ = write!(line, " {}={}", arg.name, quote(&arg.value));
        }
        line
    }
}

/// A parsed response line: `<id> <completed> <errorCode> [name=value]*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub id: u64,
    pub completed: bool,
    pub error_code: i32,
    pub arguments: Vec<Argument>,
}

impl Response {
    pub fn ok(id: u64, completed: bool) -> Self {
        Self { id, completed, error_code: 0, arguments: Vec::new() }
    }

    pub fn error(id: u64, error_code: i32, message: &str) -> Self {
        Self { id, completed: true, error_code, arguments: vec![Argument { name: "message".into(), value: message.into() }] }
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.arguments.push(Argument { name: name.into(), value: value.into() });
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.arguments.iter().find(|a| a.name == name).map(|a| a.value.as_str())
    }

    pub fn encode(&self) -> String {
        let mut line = format!("{} {} {}", self.id, self.completed as u8, self.error_code);
        for arg in &self.arguments {
            let _ = write!(line, " {}={}", arg.name, quote(&arg.value));
        }
        line
    }
}

/// Wraps a value in single quotes, backslash-escaping embedded quotes
/// and backslashes, if it is not a bare token (contains whitespace or
/// a quote character).
fn quote(value: &str) -> String {
    if !value.is_empty() && value.chars().all(|c| !c.is_whitespace() && c != '\'' && c != '\\') {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '\'' {
            chars.next();
            let mut token = String::new();
            while let Some(c) = chars.next() {
                if c == '\\' {
                    if let Some(next) = chars.next() {
                        token.push(next);
                    }
                } else if c == '\'' {
                    break;
                } else {
                    token.push(c);
                }
            }
            tokens.push(token);
        } else {
            let mut token = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                token.push(c);
                chars.next();
            }
            tokens.push(token);
        }
    }
    tokens
}

fn parse_argument(token: &str) -> Result<Argument> {
    match token.split_once('=') {
        Some((name, value)) => Ok(Argument { name: name.to_string(), value: value.to_string() }),
        None => Err(BarError::protocol(format!("malformed argument '{token}'"))),
    }
}

pub fn parse_request(line: &str) -> Result<Request> {
    let tokens = tokenize(line);
    let mut iter = tokens.into_iter();
    let id: u64 = iter
        .next()
        .ok_or_else(|| BarError::protocol("empty request line"))?
        .parse()
        .map_err(|_| BarError::protocol("non-numeric request id"))?;
    let command = iter.next().ok_or_else(|| BarError::protocol("missing command name"))?;
    let arguments = iter.map(|t| parse_argument(&t)).collect::<Result<Vec<_>>>()?;
    Ok(Request { id, command, arguments })
}

pub fn parse_response(line: &str) -> Result<Response> {
    let tokens = tokenize(line);
    let mut iter = tokens.into_iter();
    let id: u64 = iter
        .next()
        .ok_or_else(|| BarError::protocol("empty response line"))?
        .parse()
        .map_err(|_| BarError::protocol("non-numeric response id"))?;
    let completed: u8 =
        iter.next().ok_or_else(|| BarError::protocol("missing completed flag"))?.parse().map_err(|_| BarError::protocol("non-numeric completed flag"))?;
    let error_code: i32 =
        iter.next().ok_or_else(|| BarError::protocol("missing error code"))?.parse().map_err(|_| BarError::protocol("non-numeric error code"))?;
    let arguments = iter.map(|t| parse_argument(&t)).collect::<Result<Vec<_>>>()?;
    Ok(Response { id, completed: completed != 0, error_code, arguments })
}

/// Convenience: build an argument map for callers that want lookup by
/// name rather than a linear scan over a handful of entries.
pub fn arguments_to_map(arguments: &[Argument]) -> HashMap<&str, &str> {
    arguments.iter().map(|a| (a.name.as_str(), a.value.as_str())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_bare_request() {
        let req = Request { id: 7, command: "JOB_START".into(), arguments: vec![Argument { name: "jobId".into(), value: "42".into() }] };
        let encoded = req.encode();
        let parsed = parse_request(&encoded).unwrap();
        assert_eq!(parsed, req);
    }

    #[test]
    fn quotes_values_containing_whitespace() {
        let req = Request { id: 1, command: "JOB_NEW".into(), arguments: vec![Argument { name: "name".into(), value: "nightly backup".into() }] };
        let encoded = req.encode();
        assert!(encoded.contains("'nightly backup'"));
        let parsed = parse_request(&encoded).unwrap();
        assert_eq!(parsed.get("name"), Some("nightly backup"));
    }

    #[test]
    fn escapes_embedded_quotes_and_backslashes() {
        let req = Request { id: 1, command: "X".into(), arguments: vec![Argument { name: "path".into(), value: "it's a \\test".into() }] };
        let encoded = req.encode();
        let parsed = parse_request(&encoded).unwrap();
        assert_eq!(parsed.get("path"), Some("it's a \\test"));
    }

    #[test]
    fn parses_intermediate_and_final_responses() {
        let intermediate = parse_response("5 0 0 name=partial").unwrap();
        assert!(!intermediate.completed);
        let final_line = Response::ok(5, true).with_arg("name", "done").encode();
        let parsed = parse_response(&final_line).unwrap();
        assert!(parsed.completed);
        assert_eq!(parsed.get("name"), Some("done"));
    }

    #[test]
    fn error_response_carries_code_and_message() {
        let line = Response::error(9, 7, "job not found").encode();
        let parsed = parse_response(&line).unwrap();
        assert_eq!(parsed.error_code, 7);
        assert_eq!(parsed.get("message"), Some("job not found"));
    }
}
