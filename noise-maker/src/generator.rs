use chrono::{DateTime, FixedOffset};
use rand::{Rng, seq::IndexedRandom};

const METHODS: [(&str, u8); 4] = [("GET", 40), ("HEAD", 3), ("POST", 5), ("PUT", 1)];
const PAGES: [(&str, u8); 6] = [
    ("/", 10),
    ("/about/", 5),
    ("/feed/", 8),
    ("/wp-login.php", 10),
    ("/wp-content/themes/site/style.css", 10),
    ("/downloads/", 6),
];
const FILES: [(&str, u8); 5] = [
    ("2022/01/release", 20),
    ("2022/03/release-notes", 5),
    ("tools/setup", 10),
    ("tools/portable", 5),
    ("archive/old", 1),
];
const DECOYS: [(&str, u8); 3] = [(".pdf", 3), (".png", 5), (".zip.sig", 1)];
const STATUS: [(u16, u8); 6] = [
    (200, 70),
    (206, 5),
    (304, 10),
    (404, 10),
    (403, 2),
    (500, 1),
];
const AGENTS: [(&str, u8); 3] = [
    ("Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0", 10),
    ("Wget/1.21.4", 3),
    ("curl/8.5.0", 2),
];

/// One generated line and whether dlcounter should count it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub text: String,
    pub download: bool,
}

fn pick<'a, T, R: Rng + ?Sized>(rng: &mut R, table: &'a [(T, u8)]) -> &'a T {
    &table
        .choose_weighted(rng, |(_, w)| *w)
        .unwrap_or(&table[0])
        .0
}

/// Produces a combined-format line. Roughly half the requests target a file
/// under `prefix`, some of them with a suffix that should not count.
pub fn generate_access_log<R: Rng + ?Sized>(
    rng: &mut R,
    timestamp: DateTime<FixedOffset>,
    prefix: &str,
    suffixes: &[String],
) -> LogLine {
    let ip = format!(
        "192.168.{}.{}",
        rng.random_range(0..256),
        rng.random_range(0..256)
    );
    let method = *pick(rng, &METHODS);
    let status = *pick(rng, &STATUS);
    let agent = *pick(rng, &AGENTS);

    let (path, wanted_suffix) = if rng.random_bool(0.5) {
        let file = *pick(rng, &FILES);
        match suffixes.choose(rng) {
            Some(suffix) if rng.random_bool(0.9) => (format!("{prefix}{file}{suffix}"), true),
            _ => (format!("{prefix}{file}{}", pick(rng, &DECOYS)), false),
        }
    } else {
        ((*pick(rng, &PAGES)).to_string(), false)
    };
    let size = if status == 304 {
        0
    } else {
        rng.random_range(100..5_000_000)
    };
    let ts = timestamp.format("%d/%b/%Y:%H:%M:%S %z");

    LogLine {
        text: format!(
            "{ip} - - [{ts}] \"{method} {path} HTTP/1.1\" {status} {size} \"-\" \"{agent}\""
        ),
        download: wanted_suffix && method == "GET" && status == 200,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asserting::prelude::*;
    use rand::{SeedableRng, rngs::StdRng};

    fn at() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2022-01-05T10:00:00+00:00").unwrap()
    }

    #[test]
    fn lines_follow_the_combined_format() {
        let mut rng = StdRng::seed_from_u64(7);
        let line = generate_access_log(&mut rng, at(), "/wp-content/uploads/", &[".zip".into()]);
        assert_that!(line.text.as_str()).starts_with("192.168.");
        assert_that!(line.text.as_str()).contains("[05/Jan/2022:10:00:00 +0000] \"");
        assert_that!(line.text.as_str()).ends_with("\"");
    }

    #[test]
    fn download_flag_matches_the_line() {
        let mut rng = StdRng::seed_from_u64(42);
        let suffixes = vec![".zip".to_string(), ".exe".to_string()];
        let mut downloads = 0;
        for _ in 0..2_000 {
            let line = generate_access_log(&mut rng, at(), "/wp-content/uploads/", &suffixes);
            let expected = line.text.contains("\"GET /wp-content/uploads/")
                && (line.text.contains(".zip HTTP/1.1\" 200 ")
                    || line.text.contains(".exe HTTP/1.1\" 200 "));
            assert_that!(line.download).is_equal_to(expected);
            downloads += usize::from(line.download);
        }
        assert_that!(downloads).is_in_range(1..=2_000);
    }
}
