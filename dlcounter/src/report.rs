use std::{
    fmt::Display,
    io::{self, Write},
    path::Path,
};

use chrono::{DateTime, TimeZone, Utc};
use num_format::{Locale, ToFormattedString};
use tempfile::NamedTempFile;

use crate::store::DownloadRecord;

const PAGE_TOP: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8" />
<style>
table, th, td {
 border: 1px solid black;
 border-collapse: collapse;
}
th {
 background-color: #96D4D4;
}
td {
 text-align: center;
}
</style>
<title>Download counter</title>
</head>
<body>
<h1>Downloads</h1>
"#;

const PAGE_BOTTOM: &str = "</table>
</body>
</html>
";

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Renders the download table. Times use `write_format` in the `tz` zone.
pub fn render_html<Tz>(
    records: &[DownloadRecord],
    write_format: &str,
    tz: &Tz,
    generated: DateTime<Utc>,
) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let when = |dt: DateTime<Utc>| escape(&dt.with_timezone(tz).format(write_format).to_string());

    let mut page = String::from(PAGE_TOP);
    page.push_str(&format!("<h2>Updated {}</h2>\n\n", when(generated)));
    page.push_str(
        "<table style=\"width:80%\">
  <tr>
    <th>ID</th>
    <th>File</th>
    <th>Date</th>
    <th>Downloads</th>
  </tr>
",
    );
    for record in records {
        let last = record
            .last_download
            .map(|t| when(t.into_utc()))
            .unwrap_or_default();
        page.push_str(&format!(
            "  <tr>\n    <td>{}</td>\n    <td>{}</td>\n    <td>{}</td>\n    <td>{}</td>\n  </tr>\n",
            record.id,
            escape(record.file.as_str()),
            last,
            record.total
        ));
    }
    page.push_str(PAGE_BOTTOM);
    page
}

/// Writes through a sibling temp file so readers never see a partial page.
/// Each call gets its own temp name, so overlapping runs cannot clobber
/// each other's half-written file.
pub fn write_html(path: &Path, page: &str) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(page.as_bytes())?;
    #[cfg(unix)]
    {
        use std::{fs::Permissions, os::unix::fs::PermissionsExt};
        tmp.as_file().set_permissions(Permissions::from_mode(0o644))?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Plain-text dump of the table for `--verbose`.
pub fn format_table(records: &[DownloadRecord]) -> String {
    let width = records
        .iter()
        .map(|r| r.file.as_str().len())
        .max()
        .unwrap_or(0)
        .max("File".len());
    let mut out = format!("{:>4}  {:<width$}  {:<25}  {:>10}\n", "ID", "File", "Last download", "Total");
    for r in records {
        let last = r
            .last_download
            .map(|t| t.to_string())
            .unwrap_or_else(|| "-".into());
        out.push_str(&format!(
            "{:>4}  {:<width$}  {:<25}  {:>10}\n",
            r.id,
            r.file.as_str(),
            last,
            r.total.to_formatted_string(&Locale::en)
        ));
    }
    out
}
