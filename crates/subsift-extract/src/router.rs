//! Routing of records to category sinks.

use crate::error::{RecordError, Result};
use crate::report::{IssueReporter, RecordIssue};
use crate::sink::SinkSet;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use subsift_core::Record;

/// What happened to one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Appended to the sink at this position.
    Matched(usize),

    /// Parsed, but its discriminator named no configured category.
    Unmatched,

    /// Malformed; reported and dropped.
    Skipped,

    /// Whitespace only.
    Blank,
}

/// Parses records and dispatches them to at most one category sink.
pub struct CategoryRouter {
    field: String,
    sinks: Arc<SinkSet>,
    reporter: Arc<dyn IssueReporter>,
}

impl CategoryRouter {
    /// Route on `field` into `sinks`, reporting bad records to `reporter`.
    pub fn new(
        field: impl Into<String>,
        sinks: Arc<SinkSet>,
        reporter: Arc<dyn IssueReporter>,
    ) -> Self {
        Self {
            field: field.into(),
            sinks,
            reporter,
        }
    }

    /// Parse `text` and find its sink.
    ///
    /// Returns `Ok(None)` when the discriminator is not a string or names no
    /// configured category.
    pub fn classify(&self, text: &str) -> std::result::Result<Option<(usize, Value)>, RecordError> {
        let Value::Object(object) = serde_json::from_str::<Value>(text)? else {
            return Err(RecordError::NotAnObject);
        };

        let discriminator = object
            .get(&self.field)
            .ok_or_else(|| RecordError::MissingField(self.field.clone()))?;

        Ok(discriminator
            .as_str()
            .and_then(|name| self.sinks.position(name))
            .map(|position| (position, Value::Object(object))))
    }

    /// Route one record from `source`.
    ///
    /// Only sink write failures are returned as errors.
    pub fn route(&self, record: &Record, source: &Path) -> Result<RouteOutcome> {
        let text = record.text();
        if text.is_empty() {
            return Ok(RouteOutcome::Blank);
        }

        match self.classify(text) {
            Ok(Some((position, value))) => {
                let Some(sink) = self.sinks.at(position) else {
                    return Ok(RouteOutcome::Unmatched);
                };
                sink.append(&value)?;
                let category = sink.category().to_string();
                metrics::counter!("subsift_records_matched_total", "category" => category)
                    .increment(1);
                Ok(RouteOutcome::Matched(position))
            }
            Ok(None) => Ok(RouteOutcome::Unmatched),
            Err(error) => {
                self.reporter.report(RecordIssue {
                    source: source.to_path_buf(),
                    offset: record.offset(),
                    error,
                    raw: record.raw().to_string(),
                });
                Ok(RouteOutcome::Skipped)
            }
        }
    }

    /// Discriminator field name.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// The sinks this router writes to.
    pub fn sinks(&self) -> &Arc<SinkSet> {
        &self.sinks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::CollectingReporter;
    use std::fs;
    use subsift_core::LineSegmenter;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        dir: std::path::PathBuf,
        router: CategoryRouter,
        reporter: Arc<CollectingReporter>,
    }

    fn fixture(categories: &[&str]) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().to_path_buf();
        let names: Vec<String> = categories.iter().map(|s| s.to_string()).collect();
        let sinks = SinkSet::open(&names, |c| dir.join(format!("{c}.json"))).unwrap();
        let reporter = Arc::new(CollectingReporter::new());
        let router = CategoryRouter::new("subreddit", Arc::new(sinks), reporter.clone());
        Fixture {
            _tmp: tmp,
            dir,
            router,
            reporter,
        }
    }

    fn route_all(router: &CategoryRouter, input: &str) -> Vec<RouteOutcome> {
        let mut segmenter = LineSegmenter::new();
        segmenter
            .feed(input, 0)
            .map(|record| router.route(&record, Path::new("test.zst")).unwrap())
            .collect()
    }

    #[test]
    fn test_routes_only_matching_category() {
        let f = fixture(&["AskUK"]);
        let outcomes = route_all(
            &f.router,
            "{\"subreddit\":\"AskUK\",\"x\":1}\n{\"subreddit\":\"Other\",\"x\":2}\n",
        );
        assert_eq!(
            outcomes,
            vec![RouteOutcome::Matched(0), RouteOutcome::Unmatched]
        );

        f.router.sinks().close_all().unwrap();
        assert_eq!(
            fs::read_to_string(f.dir.join("AskUK.json")).unwrap(),
            r#"[{"subreddit":"AskUK","x":1}]"#
        );
        assert!(f.reporter.is_empty());
    }

    #[test]
    fn test_two_matches_same_category() {
        let f = fixture(&["AskUK", "AskNYC"]);
        route_all(
            &f.router,
            "{\"subreddit\":\"AskUK\",\"n\":1}\n{\"subreddit\":\"AskUK\",\"n\":2}\n",
        );
        f.router.sinks().close_all().unwrap();
        assert_eq!(
            fs::read_to_string(f.dir.join("AskUK.json")).unwrap(),
            r#"[{"subreddit":"AskUK","n":1},{"subreddit":"AskUK","n":2}]"#
        );
        assert_eq!(
            fs::read_to_string(f.dir.join("AskNYC.json")).unwrap(),
            "[]"
        );
    }

    #[test]
    fn test_malformed_line_is_skipped_and_reported() {
        let f = fixture(&["AskUK"]);
        let outcomes = route_all(
            &f.router,
            "{\"subreddit\":\"AskUK\",\"n\":1}\n{\"subreddit\":\n{\"subreddit\":\"AskUK\",\"n\":2}\n",
        );
        assert_eq!(
            outcomes,
            vec![
                RouteOutcome::Matched(0),
                RouteOutcome::Skipped,
                RouteOutcome::Matched(0),
            ]
        );

        let issues = f.reporter.take();
        assert_eq!(issues.len(), 1);
        assert!(matches!(issues[0].error, RecordError::Json(_)));
        assert_eq!(issues[0].raw, "{\"subreddit\":");
        assert_eq!(f.router.sinks().get("AskUK").unwrap().written(), 2);
    }

    #[test]
    fn test_missing_field_and_non_object() {
        let f = fixture(&["AskUK"]);
        let outcomes = route_all(&f.router, "{\"author\":\"x\"}\n[1,2]\n42\n");
        assert_eq!(outcomes, vec![RouteOutcome::Skipped; 3]);

        let issues = f.reporter.take();
        assert!(matches!(&issues[0].error, RecordError::MissingField(name) if name == "subreddit"));
        assert!(matches!(issues[1].error, RecordError::NotAnObject));
        assert!(matches!(issues[2].error, RecordError::NotAnObject));
    }

    #[test]
    fn test_unmatched_has_no_side_effect() {
        let f = fixture(&["AskUK"]);
        let outcomes = route_all(
            &f.router,
            "{\"subreddit\":\"askuk\"}\n{\"subreddit\":null}\n{\"subreddit\":7}\n",
        );
        assert_eq!(outcomes, vec![RouteOutcome::Unmatched; 3]);
        assert_eq!(f.router.sinks().get("AskUK").unwrap().written(), 0);
        assert!(f.reporter.is_empty());
    }

    #[test]
    fn test_blank_lines() {
        let f = fixture(&["AskUK"]);
        let outcomes = route_all(&f.router, "\n   \n\t\r\n");
        assert_eq!(outcomes, vec![RouteOutcome::Blank; 3]);
        assert!(f.reporter.is_empty());
    }

    #[test]
    fn test_classify() {
        let f = fixture(&["AskUK", "AskMen"]);
        let (position, value) = f
            .router
            .classify(r#"{"subreddit":"AskMen","body":"hi"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(position, 1);
        assert_eq!(value["body"], "hi");
        assert!(f.router.classify(r#"{"subreddit":"Other"}"#).unwrap().is_none());
        assert!(f.router.classify("not json").is_err());
    }
}
