use std::collections::HashMap;

/// Parsing phase of a request. `Finished` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsePhase {
    RequestLine,
    Headers,
    Body,
    Finished,
    Error,
}

/// A fully or partially parsed HTTP request record.
#[derive(Debug, Clone, Default)]
pub struct ParsedRequest {
    pub method: String,
    pub path: String,
    pub version: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl ParsedRequest {
    /// Returns a header value by exact field name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// True when the request explicitly asks for a persistent connection.
    pub fn wants_keep_alive(&self) -> bool {
        self.header("Connection")
            .is_some_and(|v| v.eq_ignore_ascii_case("keep-alive"))
    }
}

/// Streaming HTTP/1.1 request parser.
///
/// A byte-oriented state machine: `RequestLine -> Headers -> Body ->
/// Finished`, with `Error` on malformed input. [`feed`](Self::feed) may be
/// called any number of times as bytes arrive; it consumes nothing past the
/// terminal phase, so pipelined bytes stay with the caller. The parser
/// copies what it needs and never owns the input buffer.
pub struct RequestParser {
    phase: ParsePhase,
    request: ParsedRequest,
    line_buf: Vec<u8>,
    value_buf: Vec<u8>,
    field: String,
    expecting_value: bool,
    content_length: usize,
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            phase: ParsePhase::RequestLine,
            request: ParsedRequest::default(),
            line_buf: Vec::new(),
            value_buf: Vec::new(),
            field: String::new(),
            expecting_value: false,
            content_length: 0,
        }
    }

    /// Feeds bytes to the parser and returns how many were consumed.
    /// Consumption stops at `Finished` or `Error`.
    pub fn feed(&mut self, data: &[u8]) -> usize {
        let mut consumed = 0;
        for &byte in data {
            if matches!(self.phase, ParsePhase::Finished | ParsePhase::Error) {
                break;
            }
            consumed += 1;
            match self.phase {
                ParsePhase::RequestLine => self.feed_request_line(byte),
                ParsePhase::Headers => self.feed_header(byte),
                ParsePhase::Body => self.feed_body(byte),
                ParsePhase::Finished | ParsePhase::Error => unreachable!(),
            }
        }
        consumed
    }

    pub fn phase(&self) -> ParsePhase {
        self.phase
    }

    pub fn is_complete(&self) -> bool {
        self.phase == ParsePhase::Finished
    }

    pub fn is_error(&self) -> bool {
        self.phase == ParsePhase::Error
    }

    /// Returns the parsed request record.
    pub fn request(&self) -> &ParsedRequest {
        &self.request
    }

    /// Takes the parsed request out of the parser.
    pub fn take_request(&mut self) -> ParsedRequest {
        std::mem::take(&mut self.request)
    }

    fn feed_request_line(&mut self, byte: u8) {
        match byte {
            b'\r' => {}
            b'\n' => {
                let Ok(line) = std::str::from_utf8(&self.line_buf) else {
                    self.phase = ParsePhase::Error;
                    return;
                };
                let parts: Vec<&str> = line.split(' ').filter(|t| !t.is_empty()).collect();
                if parts.len() != 3 {
                    self.phase = ParsePhase::Error;
                    return;
                }
                self.request.method = parts[0].to_string();
                self.request.path = parts[1].to_string();
                self.request.version = parts[2].to_string();
                self.line_buf.clear();
                self.phase = ParsePhase::Headers;
            }
            _ => self.line_buf.push(byte),
        }
    }

    fn feed_header(&mut self, byte: u8) {
        match byte {
            b'\r' => {}
            b':' if !self.expecting_value => {
                let Ok(field) = std::str::from_utf8(&self.line_buf) else {
                    self.phase = ParsePhase::Error;
                    return;
                };
                self.field = trim(field).to_string();
                self.line_buf.clear();
                self.expecting_value = true;
            }
            b'\n' => {
                if self.expecting_value {
                    let Ok(value) = std::str::from_utf8(&self.value_buf) else {
                        self.phase = ParsePhase::Error;
                        return;
                    };
                    let field = std::mem::take(&mut self.field);
                    self.request.headers.insert(field, trim(value).to_string());
                    self.value_buf.clear();
                    self.expecting_value = false;
                } else if self.line_buf.is_empty() {
                    self.finish_headers();
                } else {
                    // A non-empty header line without a colon
                    self.phase = ParsePhase::Error;
                }
            }
            _ => {
                if self.expecting_value {
                    self.value_buf.push(byte);
                } else {
                    self.line_buf.push(byte);
                }
            }
        }
    }

    fn feed_body(&mut self, byte: u8) {
        self.request.body.push(byte);
        if self.request.body.len() >= self.content_length {
            self.phase = ParsePhase::Finished;
        }
    }

    fn finish_headers(&mut self) {
        match self.request.header("Content-Length") {
            Some(value) => match value.parse::<usize>() {
                Ok(0) => self.phase = ParsePhase::Finished,
                Ok(n) => {
                    self.content_length = n;
                    self.phase = ParsePhase::Body;
                }
                Err(_) => self.phase = ParsePhase::Error,
            },
            None => self.phase = ParsePhase::Finished,
        }
    }
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

fn trim(s: &str) -> &str {
    s.trim_matches(|c| c == ' ' || c == '\t')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(input: &[u8]) -> RequestParser {
        let mut parser = RequestParser::new();
        parser.feed(input);
        parser
    }

    #[test]
    fn test_parse_simple_get() {
        let parser = parse_all(b"GET /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n");

        assert!(parser.is_complete());
        let req = parser.request();
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/index.html");
        assert_eq!(req.version, "HTTP/1.1");
        assert_eq!(req.header("Host"), Some("localhost"));
    }

    #[test]
    fn test_parse_is_partition_independent() {
        let input = b"GET /a.html HTTP/1.1\r\nHost: x\r\nConnection: keep-alive\r\n\r\n";

        let whole = parse_all(input);

        let mut byte_by_byte = RequestParser::new();
        for &b in input.iter() {
            byte_by_byte.feed(&[b]);
        }

        assert!(whole.is_complete());
        assert!(byte_by_byte.is_complete());
        assert_eq!(whole.request().path, byte_by_byte.request().path);
        assert_eq!(
            whole.request().headers,
            byte_by_byte.request().headers
        );
    }

    #[test]
    fn test_parse_collapses_repeated_spaces() {
        let parser = parse_all(b"GET  /a.html   HTTP/1.1\r\n\r\n");
        assert!(parser.is_complete());
        assert_eq!(parser.request().path, "/a.html");
    }

    #[test]
    fn test_parse_rejects_short_request_line() {
        let parser = parse_all(b"GET\r\n\r\n");
        assert!(parser.is_error());
    }

    #[test]
    fn test_parse_rejects_long_request_line() {
        let parser = parse_all(b"GET /a.html HTTP/1.1 extra\r\n\r\n");
        assert!(parser.is_error());
    }

    #[test]
    fn test_parse_trims_header_whitespace() {
        let parser = parse_all(b"GET / HTTP/1.1\r\n  Accept \t:  text/html \r\n\r\n");
        assert!(parser.is_complete());
        assert_eq!(parser.request().header("Accept"), Some("text/html"));
    }

    #[test]
    fn test_parse_rejects_header_without_colon() {
        let parser = parse_all(b"GET / HTTP/1.1\r\nnot-a-header\r\n\r\n");
        assert!(parser.is_error());
    }

    #[test]
    fn test_parse_body_by_content_length() {
        let parser = parse_all(b"POST /submit HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello");
        assert!(parser.is_complete());
        assert_eq!(parser.request().body, b"hello");
    }

    #[test]
    fn test_parse_zero_content_length_finishes_at_headers() {
        let parser = parse_all(b"GET / HTTP/1.1\r\nContent-Length: 0\r\n\r\n");
        assert!(parser.is_complete());
        assert!(parser.request().body.is_empty());
    }

    #[test]
    fn test_parse_rejects_bad_content_length() {
        let parser = parse_all(b"GET / HTTP/1.1\r\nContent-Length: lots\r\n\r\n");
        assert!(parser.is_error());
    }

    #[test]
    fn test_parse_waits_for_full_body() {
        let mut parser = RequestParser::new();
        parser.feed(b"POST / HTTP/1.1\r\nContent-Length: 4\r\n\r\nab");
        assert_eq!(parser.phase(), ParsePhase::Body);

        parser.feed(b"cd");
        assert!(parser.is_complete());
        assert_eq!(parser.request().body, b"abcd");
    }

    #[test]
    fn test_parse_stops_consuming_after_finish() {
        let mut parser = RequestParser::new();
        let first = b"GET /a HTTP/1.1\r\n\r\n";
        let two = b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n";

        let consumed = parser.feed(two);

        assert!(parser.is_complete());
        assert_eq!(consumed, first.len());
        assert_eq!(parser.request().path, "/a");

        // Feeding more is a no-op once finished.
        assert_eq!(parser.feed(&two[consumed..]), 0);
    }

    #[test]
    fn test_wants_keep_alive() {
        let parser = parse_all(b"GET / HTTP/1.1\r\nConnection: Keep-Alive\r\n\r\n");
        assert!(parser.request().wants_keep_alive());

        let parser = parse_all(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n");
        assert!(!parser.request().wants_keep_alive());

        let parser = parse_all(b"GET / HTTP/1.1\r\n\r\n");
        assert!(!parser.request().wants_keep_alive());
    }
}
