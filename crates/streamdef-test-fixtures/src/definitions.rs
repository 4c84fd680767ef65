//! Entity fixtures.

use streamdef_types::{
    Branch, BranchKey, By, Sink, SinkKey, Source, SourceKey, TableColumn,
};

pub fn test_by() -> By {
    By::user("user-1", "Test User")
}

pub fn test_branch_key() -> BranchKey {
    BranchKey::new(123, 456)
}

pub fn test_source_key(source_id: &str) -> SourceKey {
    test_branch_key().source(source_id)
}

pub fn test_sink_key(source_id: &str, sink_id: &str) -> SinkKey {
    test_source_key(source_id).sink(sink_id)
}

pub fn test_branch(key: BranchKey) -> Branch {
    Branch::new(key)
}

pub fn test_source(key: SourceKey) -> Source {
    let mut source = Source::new(key, "My Source").with_http("0123456789abcdef");
    source.description = "My Description".to_string();
    source
}

pub fn test_sink(key: SinkKey) -> Sink {
    let mut sink = Sink::new(key, "My Sink").with_table(
        "in.bucket.table",
        vec![
            TableColumn {
                name: "datetime".to_string(),
                column_type: "datetime".to_string(),
                primary_key: true,
            },
            TableColumn {
                name: "body".to_string(),
                column_type: "body".to_string(),
                primary_key: false,
            },
        ],
    );
    sink.description = "My Description".to_string();
    sink
}
