use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

use crate::{
    error::ParseError,
    invariants::{FileId, Timestamp},
    models::{AccessLogLine, DownloadEvent},
};

pub const SUCCESS_STATUS: u16 = 200;

// remote-addr ident user [timestamp] "request" status bytes ["referer" "user-agent"]
static LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(\S+) \S+ \S+ \[([^\]]+)\] "((?:[^"\\]|\\.)*)" (\S+) (\S+)(?: "((?:[^"\\]|\\.)*)" "((?:[^"\\]|\\.)*)")?"#,
    )
    .expect("access log regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchConfig {
    pub path_prefix: String,
    pub suffixes: Vec<String>,
    pub methods: Vec<String>,
    pub timestamp_format: String,
}

pub fn parse_log_line(line: &str, timestamp_format: &str) -> Result<AccessLogLine, ParseError> {
    let caps = LINE.captures(line).ok_or(ParseError::Malformed)?;
    let field = |i: usize| caps.get(i).map(|m| m.as_str());

    let raw_ts = field(2).ok_or(ParseError::Malformed)?;
    let timestamp =
        Timestamp::parse(raw_ts, timestamp_format).ok_or_else(|| ParseError::Timestamp {
            raw: raw_ts.into(),
            format: timestamp_format.into(),
        })?;

    let mut request = field(3).ok_or(ParseError::Malformed)?.split_whitespace();
    let method = request.next().ok_or(ParseError::Malformed)?.to_string();
    let path = request.next().ok_or(ParseError::Malformed)?.to_string();
    let protocol = request.next().map(str::to_string);

    let status_str = field(4).ok_or(ParseError::Malformed)?;
    let status = status_str
        .parse::<u16>()
        .ok()
        .filter(|s| (100..1000).contains(s))
        .ok_or_else(|| ParseError::Field {
            field: "status",
            value: status_str.into(),
        })?;
    let bytes_str = field(5).ok_or(ParseError::Malformed)?;
    let bytes = if bytes_str == "-" {
        0
    } else {
        bytes_str.parse::<u64>().map_err(|_| ParseError::Field {
            field: "bytes",
            value: bytes_str.into(),
        })?
    };

    Ok(AccessLogLine {
        remote_addr: field(1).ok_or(ParseError::Malformed)?.to_string(),
        timestamp,
        method,
        path,
        protocol,
        status,
        bytes,
        referer: field(6).map(str::to_string),
        user_agent: field(7).map(str::to_string),
    })
}

/// Classifies raw log lines as download events.
#[derive(Debug, Clone)]
pub struct Matcher {
    config: MatchConfig,
}

impl Matcher {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    /// `Ok(None)` when the line is well formed but not a qualifying download.
    /// Lines that never mention the prefix are rejected without parsing.
    pub fn classify(&self, line: &str) -> Result<Option<DownloadEvent>, ParseError> {
        if !line.contains(&self.config.path_prefix) {
            return Ok(None);
        }
        let entry = parse_log_line(line, &self.config.timestamp_format)?;
        if entry.status != SUCCESS_STATUS
            || !self.config.methods.iter().any(|m| *m == entry.method)
        {
            return Ok(None);
        }
        let Some(file) = self.file_id(&entry.path) else {
            return Ok(None);
        };
        trace!(
            %file,
            remote = %entry.remote_addr,
            protocol = ?entry.protocol,
            bytes = entry.bytes,
            referer = ?entry.referer,
            agent = ?entry.user_agent,
            "download"
        );
        Ok(Some(DownloadEvent {
            file,
            timestamp: entry.timestamp,
        }))
    }

    /// The part of the path after the first prefix occurrence, when the path
    /// (without query string or fragment) ends with a configured suffix.
    fn file_id(&self, target: &str) -> Option<FileId> {
        let path = target.split(['?', '#']).next().unwrap_or(target);
        let start = path.find(&self.config.path_prefix)? + self.config.path_prefix.len();
        let relative = &path[start..];
        if !self.config.suffixes.iter().any(|s| relative.ends_with(s.as_str())) {
            return None;
        }
        relative.parse().ok()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use asserting::{expectations::IsEqualTo, prelude::*};
    use chrono::prelude::*;

    const FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

    fn matcher() -> Matcher {
        Matcher::new(MatchConfig {
            path_prefix: "/wp-content/uploads/".into(),
            suffixes: vec![".zip".into(), ".exe".into()],
            methods: vec!["GET".into()],
            timestamp_format: FORMAT.into(),
        })
    }

    fn line(method: &str, path: &str, status: u16) -> String {
        format!(
            r#"203.0.113.9 - - [05/Jan/2022:10:00:00 +0000] "{method} {path} HTTP/1.1" {status} 5120 "https://example.com/" "Mozilla/5.0 (X11; Linux x86_64)""#
        )
    }

    #[test]
    fn parse_log_line_valid() {
        let line =
            r#"202.32.92.47 - - [01/Jun/1995:00:00:59 -0600] "GET /~scottp/publish.html" 200 271"#;
        assert_that!(parse_log_line(line, FORMAT))
            .is_ok()
            .mapping(|o| o.unwrap())
            .expecting(IsEqualTo {
                expected: AccessLogLine {
                    remote_addr: "202.32.92.47".into(),
                    timestamp: FixedOffset::west_opt(6 * 3600)
                        .unwrap()
                        .with_ymd_and_hms(1995, 6, 1, 0, 0, 59)
                        .unwrap()
                        .with_timezone(&Utc)
                        .into(),
                    method: "GET".into(),
                    path: "/~scottp/publish.html".into(),
                    protocol: None,
                    status: 200,
                    bytes: 271,
                    referer: None,
                    user_agent: None,
                },
            });
    }

    #[test]
    fn parse_combined_format() {
        let entry = parse_log_line(&line("GET", "/wp-content/uploads/a.zip", 200), FORMAT).unwrap();
        assert_that!(entry.protocol).is_equal_to(Some("HTTP/1.1".to_string()));
        assert_that!(entry.referer).is_equal_to(Some("https://example.com/".to_string()));
        assert_that!(entry.user_agent)
            .is_equal_to(Some("Mozilla/5.0 (X11; Linux x86_64)".to_string()));
        assert_that!(entry.bytes).is_equal_to(5120);
    }

    #[test]
    fn dash_bytes_is_zero() {
        let line = r#"10.0.0.1 - bob [05/Jan/2022:10:00:00 +0000] "GET / HTTP/1.0" 304 -"#;
        assert_that!(parse_log_line(line, FORMAT).unwrap().bytes).is_equal_to(0);
    }

    #[test]
    fn malformed_lines_are_errors() {
        assert_that!(parse_log_line("", FORMAT)).is_equal_to(Err(ParseError::Malformed));
        assert_that!(parse_log_line("just some words", FORMAT))
            .is_equal_to(Err(ParseError::Malformed));
        let bad_status =
            r#"10.0.0.1 - - [05/Jan/2022:10:00:00 +0000] "GET /x HTTP/1.1" abc 1"#;
        assert!(matches!(
            parse_log_line(bad_status, FORMAT),
            Err(ParseError::Field { field: "status", .. })
        ));
    }

    #[test]
    fn bad_timestamp_is_a_parse_error() {
        let line =
            r#"10.0.0.1 - - [2022-01-05T10:00:00Z] "GET /wp-content/uploads/a.zip HTTP/1.1" 200 1"#;
        assert!(matches!(
            matcher().classify(line),
            Err(ParseError::Timestamp { .. })
        ));
    }

    #[test]
    fn qualifying_download_yields_relative_file_id() {
        let event = matcher()
            .classify(&line("GET", "/wp-content/uploads/2022/01/a.zip", 200))
            .unwrap()
            .unwrap();
        assert_that!(event.file.as_str()).is_equal_to("2022/01/a.zip");
        assert_that!(event.timestamp.into_utc())
            .is_equal_to(Utc.with_ymd_and_hms(2022, 1, 5, 10, 0, 0).unwrap());
    }

    #[test]
    fn non_success_status_is_no_match() {
        for status in [206, 301, 304, 404, 500] {
            assert_that!(matcher().classify(&line("GET", "/wp-content/uploads/a.zip", status)))
                .is_equal_to(Ok(None));
        }
    }

    #[test]
    fn wrong_suffix_is_no_match() {
        assert_that!(matcher().classify(&line("GET", "/wp-content/uploads/a.tar.gz", 200)))
            .is_equal_to(Ok(None));
        assert_that!(matcher().classify(&line("GET", "/wp-content/uploads/a.zip.sig", 200)))
            .is_equal_to(Ok(None));
    }

    #[test]
    fn missing_prefix_is_no_match() {
        assert_that!(matcher().classify(&line("GET", "/downloads/a.zip", 200)))
            .is_equal_to(Ok(None));
    }

    #[test]
    fn other_methods_are_no_match() {
        assert_that!(matcher().classify(&line("HEAD", "/wp-content/uploads/a.zip", 200)))
            .is_equal_to(Ok(None));
        assert_that!(matcher().classify(&line("POST", "/wp-content/uploads/a.zip", 200)))
            .is_equal_to(Ok(None));
    }

    #[test]
    fn prefix_may_appear_anywhere_in_the_path() {
        let event = matcher()
            .classify(&line("GET", "/blog/wp-content/uploads/tools/setup.exe", 200))
            .unwrap()
            .unwrap();
        assert_that!(event.file.as_str()).is_equal_to("tools/setup.exe");
    }

    #[test]
    fn query_string_is_ignored() {
        let event = matcher()
            .classify(&line("GET", "/wp-content/uploads/a.zip?ver=2", 200))
            .unwrap()
            .unwrap();
        assert_that!(event.file.as_str()).is_equal_to("a.zip");
    }

    #[test]
    fn empty_prefix_keys_on_the_whole_path() {
        let matcher = Matcher::new(MatchConfig {
            path_prefix: String::new(),
            ..matcher().config
        });
        let event = matcher
            .classify(&line("GET", "/files/a.zip", 200))
            .unwrap()
            .unwrap();
        assert_that!(event.file.as_str()).is_equal_to("/files/a.zip");
    }

    #[test]
    fn bare_prefix_is_no_match() {
        assert_that!(matcher().classify(&line("GET", "/wp-content/uploads/", 200)))
            .is_equal_to(Ok(None));
    }
}
