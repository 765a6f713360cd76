//! Decoding of `svn ... --xml` reports

use harvest_core::{HarvestError, ListElement, LogElement, Result};
use serde::de::DeserializeOwned;

/// Longest payload prefix quoted in a decode error
const EXCERPT_LIMIT: usize = 256;

/// Decode the output of `svn list --xml`
pub fn decode_list(xml: &[u8]) -> Result<ListElement> {
    decode(xml)
}

/// Decode the output of `svn log --xml`, ranged or not
pub fn decode_log(xml: &[u8]) -> Result<LogElement> {
    decode(xml)
}

fn decode<T: DeserializeOwned>(xml: &[u8]) -> Result<T> {
    quick_xml::de::from_reader(xml).map_err(|e| HarvestError::Decode {
        excerpt: excerpt(xml),
        reason: e.to_string(),
    })
}

fn excerpt(xml: &[u8]) -> String {
    let text = String::from_utf8_lossy(xml);
    if text.len() <= EXCERPT_LIMIT {
        return text.into_owned();
    }

    let mut end = EXCERPT_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use harvest_core::{Action, NodeKind};

    const LIST_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<lists>
<list
   path="https://example/repo/trunk">
<entry
   kind="file">
<name>README.md</name>
<size>1042</size>
<commit
   revision="1871">
<author>alice</author>
<date>2024-03-01T10:15:30.123456Z</date>
</commit>
</entry>
<entry
   kind="dir">
<name>src</name>
<commit
   revision="1902">
<author>bob</author>
<date>2024-03-05T08:00:00.000000Z</date>
</commit>
</entry>
</list>
</lists>
"#;

    const LOG_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<log>
<logentry
   revision="1902">
<author>bob</author>
<date>2024-03-05T08:00:00.000000Z</date>
<paths>
<path
   text-mods="false"
   kind="dir"
   action="A"
   prop-mods="false">/trunk/src</path>
<path
   text-mods="true"
   kind="file"
   action="M"
   prop-mods="false">/trunk/README.md</path>
</paths>
</logentry>
</log>
"#;

    #[test]
    fn test_decode_list() {
        let entries = decode_list(LIST_XML.as_bytes()).unwrap().into_entries();
        assert_eq!(entries.len(), 2);

        let file = &entries[0];
        assert_eq!(file.kind, NodeKind::File);
        assert_eq!(file.name, "README.md");
        assert_eq!(file.size, Some(1042));
        assert_eq!(file.commit.revision, "1871");
        assert_eq!(file.commit.author, "alice");
        assert_eq!(
            file.commit.date,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 30).unwrap()
                + chrono::Duration::microseconds(123_456)
        );

        let dir = &entries[1];
        assert_eq!(dir.kind, NodeKind::Dir);
        assert_eq!(dir.name, "src");
        assert_eq!(dir.size, None);
        assert_eq!(dir.commit.revision, "1902");
        assert_eq!(dir.commit.author, "bob");
        assert_eq!(
            dir.commit.date,
            Utc.with_ymd_and_hms(2024, 3, 5, 8, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_decode_list_keeps_list_path() {
        let lists = decode_list(LIST_XML.as_bytes()).unwrap();
        assert_eq!(lists.lists.len(), 1);
        assert_eq!(lists.lists[0].path, "https://example/repo/trunk");
    }

    #[test]
    fn test_decode_log() {
        let log = decode_log(LOG_XML.as_bytes()).unwrap();
        assert_eq!(log.entries.len(), 1);

        let entry = &log.entries[0];
        assert_eq!(entry.revision, "1902");
        assert_eq!(entry.author, "bob");
        assert_eq!(entry.date, "2024-03-05T08:00:00.000000Z");
        assert_eq!(entry.msg, None);
        assert_eq!(entry.paths.len(), 2);

        assert_eq!(entry.paths[0].path, "/trunk/src");
        assert_eq!(entry.paths[0].kind, NodeKind::Dir);
        assert_eq!(entry.paths[0].action, Action::Added);
        assert_eq!(entry.paths[0].text_mods, "false");
        assert_eq!(entry.paths[1].path, "/trunk/README.md");
        assert_eq!(entry.paths[1].kind, NodeKind::File);
        assert_eq!(entry.paths[1].action, Action::Modified);
        assert_eq!(entry.paths[1].text_mods, "true");
        assert_eq!(entry.paths[1].prop_mods, "false");
    }

    #[test]
    fn test_decode_log_copy_source_and_message() {
        let xml = r#"<log>
<logentry revision="7">
<author>carol</author>
<date>2024-01-01T00:00:00.000000Z</date>
<paths>
<path kind="dir" action="A" copyfrom-path="/trunk" copyfrom-rev="6" text-mods="false" prop-mods="false">/branches/b1</path>
</paths>
<msg>Create branch b1</msg>
</logentry>
</log>"#;

        let log = decode_log(xml.as_bytes()).unwrap();
        let path = &log.entries[0].paths[0];
        assert_eq!(path.copyfrom_path.as_deref(), Some("/trunk"));
        assert_eq!(path.copyfrom_rev.as_deref(), Some("6"));
        assert_eq!(log.entries[0].msg.as_deref(), Some("Create branch b1"));
    }

    #[test]
    fn test_decode_empty_results() {
        let lists = decode_list(
            br#"<?xml version="1.0" encoding="UTF-8"?>
<lists>
<list
   path="https://example/repo/empty">
</list>
</lists>
"#,
        )
        .unwrap();
        assert_eq!(lists.entries().count(), 0);

        let log = decode_log(b"<?xml version=\"1.0\"?>\n<log>\n</log>\n").unwrap();
        assert!(log.entries.is_empty());
    }

    #[test]
    fn test_decode_malformed_xml() {
        let err = decode_list(b"svn: E170000: URL 'https://example/repo/x' doesn't exist")
            .unwrap_err();

        match err {
            HarvestError::Decode { excerpt, reason } => {
                assert!(excerpt.starts_with("svn: E170000"));
                assert!(!reason.is_empty());
            }
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_error_excerpt_is_bounded() {
        let mut payload = String::from("<lists><list><entry kind=\"file\"><name>");
        payload.push_str(&"é".repeat(400));

        let err = decode_list(payload.as_bytes()).unwrap_err();
        let HarvestError::Decode { excerpt, .. } = err else {
            panic!("expected decode error");
        };
        assert!(excerpt.ends_with("..."));
        assert!(excerpt.len() <= EXCERPT_LIMIT + 3);
    }
}
