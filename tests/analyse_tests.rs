use borealis_db::{
    AnalyseRequest, Borealis, Conditions, Config, Document, Result, StoreError, TextCompletion,
    Value, doc,
};
use std::cell::RefCell;

/// A canned completion that records the prompt it was handed.
struct Canned {
    response: String,
    last_prompt: RefCell<Option<String>>,
}

impl Canned {
    fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            last_prompt: RefCell::new(None),
        }
    }
}

impl TextCompletion for Canned {
    fn complete(&self, prompt: &str, _model: &str, _api_key: &str) -> Result<String> {
        *self.last_prompt.borrow_mut() = Some(prompt.to_string());
        Ok(self.response.clone())
    }
}

fn seeded_store(dir: &tempfile::TempDir) -> Borealis {
    let mut db = Borealis::open(Config::with_directory(dir.path().join("data"))).unwrap();
    db.create("people", doc! { "name" => "Ada", "age" => 36 }).unwrap();
    db.create("people", doc! { "name" => "Brian", "age" => 17 }).unwrap();
    db.create("people", doc! { "name" => "Grace", "age" => 45 }).unwrap();
    db
}

#[test]
fn analyse_resolves_indexes_against_the_collection() {
    let dir = tempfile::tempdir().unwrap();
    let db = seeded_store(&dir);

    let completion = Canned::new(
        r#"```json
{"indexes": [0, 2], "reason": "both are adults", "message": "done"}
```"#,
    );
    let analysis = db
        .analyse(
            AnalyseRequest {
                collection: Some("people"),
                model: "test-model",
                api_key: "test-key",
                query: "who is an adult?",
                ..AnalyseRequest::default()
            },
            &completion,
        )
        .unwrap();

    assert_eq!(analysis.indexes, vec![0, 2]);
    assert_eq!(analysis.data.len(), 2);
    assert_eq!(analysis.data[0].get("name"), Some(&Value::from("Ada")));
    assert_eq!(analysis.reason, "both are adults");

    let prompt = completion.last_prompt.borrow().clone().unwrap();
    assert!(prompt.contains("who is an adult?"));
    assert!(prompt.contains("\"Brian\""));
}

#[test]
fn filter_narrows_candidates_before_the_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let db = seeded_store(&dir);

    let filter = Conditions::from_document(&doc! { "age" => doc! { "$gte" => 18 } }).unwrap();
    let completion = Canned::new(r#"{"indexes": [0]}"#);
    let analysis = db
        .analyse(
            AnalyseRequest {
                collection: Some("people"),
                filter: Some(&filter),
                model: "m",
                api_key: "k",
                query: "oldest?",
                ..AnalyseRequest::default()
            },
            &completion,
        )
        .unwrap();

    // Index 0 resolves inside the filtered candidate list.
    assert_eq!(analysis.data[0].get("name"), Some(&Value::from("Ada")));
    let prompt = completion.last_prompt.borrow().clone().unwrap();
    assert!(!prompt.contains("\"Brian\""));
}

#[test]
fn inline_data_excludes_a_collection_argument() {
    let dir = tempfile::tempdir().unwrap();
    let db = seeded_store(&dir);
    let inline: Vec<Document> = vec![doc! { "x" => 1 }];

    let completion = Canned::new(r#"{"indexes": [0]}"#);
    let result = db.analyse(
        AnalyseRequest {
            collection: Some("people"),
            data: Some(inline),
            model: "m",
            api_key: "k",
            query: "q",
            ..AnalyseRequest::default()
        },
        &completion,
    );
    assert!(matches!(result, Err(StoreError::Validation(_))));
}

#[test]
fn request_arguments_are_validated() {
    let dir = tempfile::tempdir().unwrap();
    let db = seeded_store(&dir);
    let completion = Canned::new(r#"{"indexes": []}"#);

    let missing_model = db.analyse(
        AnalyseRequest {
            collection: Some("people"),
            api_key: "k",
            query: "q",
            ..AnalyseRequest::default()
        },
        &completion,
    );
    assert!(matches!(missing_model, Err(StoreError::Validation(_))));

    let long_query = "q".repeat(1025);
    let too_long = db.analyse(
        AnalyseRequest {
            collection: Some("people"),
            model: "m",
            api_key: "k",
            query: &long_query,
            ..AnalyseRequest::default()
        },
        &completion,
    );
    assert!(matches!(too_long, Err(StoreError::Validation(_))));
}

#[test]
fn unusable_responses_fail_distinctly() {
    let dir = tempfile::tempdir().unwrap();
    let db = seeded_store(&dir);

    for bad in [
        "I'm sorry, I can't produce JSON here.",
        r#"{"reason": "forgot the list"}"#,
    ] {
        let completion = Canned::new(bad);
        let result = db.analyse(
            AnalyseRequest {
                collection: Some("people"),
                model: "m",
                api_key: "k",
                query: "q",
                ..AnalyseRequest::default()
            },
            &completion,
        );
        assert!(matches!(result, Err(StoreError::Analysis(_))), "{}", bad);
    }
}

#[test]
fn empty_candidates_are_not_sent_to_the_model() {
    let dir = tempfile::tempdir().unwrap();
    let db = seeded_store(&dir);

    let filter = Conditions::from_document(&doc! { "age" => doc! { "$gt" => 200 } }).unwrap();
    let completion = Canned::new(r#"{"indexes": []}"#);
    let result = db.analyse(
        AnalyseRequest {
            collection: Some("people"),
            filter: Some(&filter),
            model: "m",
            api_key: "k",
            query: "q",
            ..AnalyseRequest::default()
        },
        &completion,
    );
    assert!(matches!(result, Err(StoreError::NotFound(_))));
    assert!(completion.last_prompt.borrow().is_none());
}
