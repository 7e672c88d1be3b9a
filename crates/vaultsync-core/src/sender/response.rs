//! Package manager response parsing.
//!
//! The service answers with a small CRX XML document: an install log inside
//! `<data><log>` and an overall `<status code="...">`.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::PushError;

/// Marker at the start of a log line reporting a node that failed to install.
pub const ERROR_MARKER: &str = "E ";

static STATUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<status\s+code\s*=\s*"([^"]*)"\s*>(.*?)</status>"#)
        .expect("status pattern is valid")
});

static LOG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<log>(.*?)</log>").expect("log pattern is valid"));

static CDATA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").expect("cdata pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrxResponse {
    pub code: String,
    pub message: String,
    pub log: String,
}

impl CrxResponse {
    /// Distinct log lines reporting failed nodes, in log order.
    pub fn error_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = Vec::new();
        for line in self.log.lines().map(str::trim) {
            if line.starts_with(ERROR_MARKER) && !lines.iter().any(|l| l == line) {
                lines.push(line.to_string());
            }
        }
        lines
    }

    pub fn outcome(&self) -> Result<(), PushError> {
        let lines = self.error_lines();
        if !lines.is_empty() {
            return Err(PushError::NodeInstall { lines });
        }
        if self.code != "200" {
            return Err(PushError::Status {
                code: self.code.clone(),
                message: self.message.clone(),
            });
        }
        Ok(())
    }
}

pub fn parse_response(body: &str) -> Result<CrxResponse, PushError> {
    let status = STATUS.captures(body).ok_or(PushError::UnexpectedResponse)?;
    let code = status.get(1).map_or("", |m| m.as_str()).trim().to_string();
    let message = text(status.get(2).map_or("", |m| m.as_str()));

    let log = LOG
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| text(m.as_str()))
        .unwrap_or_default();

    Ok(CrxResponse { code, message, log })
}

/// Character data of an element: CDATA sections unwrapped, entities decoded.
fn text(raw: &str) -> String {
    let unwrapped = CDATA.replace_all(raw, "$1");
    unwrapped
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PushErrorKind;
    use pretty_assertions::assert_eq;

    fn body(log: &str, code: &str, message: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<crx version="1.4.1" user="admin" workspace="crx.default">
  <request>
    <param name="file" value="vaultsync.zip"/>
  </request>
  <response>
    <data>
      <package><group>vaultsync</group></package>
      <log>{log}</log>
    </data>
    <status code="{code}">{message}</status>
  </response>
</crx>"#
        )
    }

    #[test]
    fn successful_install() {
        let response = parse_response(&body("A /apps/x\nU /apps/y\n", "200", "ok")).unwrap();
        assert_eq!(response.code, "200");
        assert_eq!(response.message, "ok");
        assert!(response.outcome().is_ok());
    }

    #[test]
    fn error_lines_are_unique() {
        let log = "A /apps/x\nE /apps/y (boom)\nE /apps/y (boom)\nE /apps/z (bang)\n";
        let response = parse_response(&body(log, "200", "ok")).unwrap();
        assert_eq!(
            response.error_lines(),
            vec!["E /apps/y (boom)".to_string(), "E /apps/z (bang)".to_string()]
        );
        let err = response.outcome().unwrap_err();
        assert_eq!(err.kind(), PushErrorKind::RemoteNode);
    }

    #[test]
    fn status_code_failure() {
        let response = parse_response(&body("", "500", "Package &amp; install failed")).unwrap();
        match response.outcome() {
            Err(PushError::Status { code, message }) => {
                assert_eq!(code, "500");
                assert_eq!(message, "Package & install failed");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn cdata_log_is_unwrapped() {
        let response =
            parse_response(&body("<![CDATA[E /apps/<odd> (x)]]>", "200", "ok")).unwrap();
        assert_eq!(response.error_lines(), vec!["E /apps/<odd> (x)".to_string()]);
    }

    #[test]
    fn garbage_is_unexpected() {
        let err = parse_response("<html>Login</html>").unwrap_err();
        assert!(matches!(err, PushError::UnexpectedResponse));
        assert_eq!(err.kind(), PushErrorKind::Protocol);
    }
}
