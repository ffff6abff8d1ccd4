use devchat_core::*;
use serde_json::json;
use tempfile::TempDir;

fn finished_prompt(request: &str, responses: &[&str], created: i64) -> Prompt {
    let mut prompt = Prompt::new(ProviderKind::OpenAI, "gpt-4", "Ada", "ada@example.com");
    prompt.set_request(request);
    let choices: Vec<_> = responses
        .iter()
        .enumerate()
        .map(|(i, c)| {
            json!({"message": {"role": "assistant", "content": c}, "finish_reason": "stop", "index": i})
        })
        .collect();
    let blob = json!({
        "created": created,
        "model": "gpt-4",
        "usage": {"prompt_tokens": 5, "completion_tokens": 5},
        "choices": choices
    });
    prompt.set_response(&blob.to_string()).unwrap();
    prompt
}

// ========================================================================
// MemoryStore
// ========================================================================

#[test]
fn test_memory_store_roundtrip() {
    let store = MemoryStore::new();
    let prompt = finished_prompt("q", &["a"], 100);
    store.store_prompt(&prompt).unwrap();

    let hash = prompt.hash(0).unwrap();
    let loaded = store.get_prompt(&hash).unwrap();
    assert_eq!(loaded.request().unwrap().content, "q");
    assert_eq!(loaded.hash(0).unwrap(), hash);
}

#[test]
fn test_memory_store_missing_hash() {
    let store = MemoryStore::new();
    assert!(matches!(
        store.get_prompt("abc"),
        Err(DevchatError::NotFound(_))
    ));
}

#[test]
fn test_store_rejects_prompt_without_response() {
    let store = MemoryStore::new();
    let mut prompt = Prompt::new(ProviderKind::OpenAI, "gpt-4", "Ada", "ada@example.com");
    prompt.set_request("q");

    assert!(matches!(
        store.store_prompt(&prompt),
        Err(DevchatError::Validation(_))
    ));
    assert!(store.is_empty());
}

#[test]
fn test_store_is_idempotent() {
    let store = MemoryStore::new();
    let prompt = finished_prompt("q", &["a", "b"], 100);
    store.store_prompt(&prompt).unwrap();
    store.store_prompt(&prompt).unwrap();

    assert_eq!(store.len(), 2);
    assert_eq!(store.list_recent(10).unwrap().len(), 1);
}

#[test]
fn test_resolve_hash_prefixes() {
    let store = MemoryStore::new();
    let prompt = finished_prompt("q", &["a"], 100);
    store.store_prompt(&prompt).unwrap();
    let hash = prompt.hash(0).unwrap();

    assert_eq!(store.resolve_hash(&hash[..4]).unwrap(), hash);
    assert_eq!(store.resolve_hash(&hash.to_uppercase()).unwrap(), hash);
    assert!(matches!(
        store.resolve_hash("ffffffffffffffff"),
        Err(DevchatError::NotFound(_))
    ));
    assert!(matches!(
        store.resolve_hash(""),
        Err(DevchatError::Validation(_))
    ));
}

#[test]
fn test_resolve_hash_ambiguous_prefix() {
    let store = MemoryStore::new();
    // Enough prompts that at least two hashes share a first hex digit.
    let prompts: Vec<Prompt> = (0..17)
        .map(|i| finished_prompt("q", &[format!("answer {i}").as_str()], i))
        .collect();
    for p in &prompts {
        store.store_prompt(p).unwrap();
    }

    let hashes = store.hashes().unwrap();
    let shared = hashes
        .windows(2)
        .find(|w| w[0][..1] == w[1][..1])
        .map(|w| w[0][..1].to_string())
        .unwrap();

    let err = store.resolve_hash(&shared).unwrap_err();
    assert!(matches!(err, DevchatError::AmbiguousHash { .. }));
    assert!(err.is_not_found());
}

#[test]
fn test_list_recent_newest_first() {
    let store = MemoryStore::new();
    store.store_prompt(&finished_prompt("old", &["1"], 100)).unwrap();
    store.store_prompt(&finished_prompt("new", &["2"], 300)).unwrap();
    store.store_prompt(&finished_prompt("mid", &["3"], 200)).unwrap();

    let recent = store.list_recent(2).unwrap();
    let requests: Vec<&str> = recent
        .iter()
        .map(|p| p.request().unwrap().content.as_str())
        .collect();
    assert_eq!(requests, vec!["new", "mid"]);
}

// ========================================================================
// FileStore
// ========================================================================

#[test]
fn test_file_store_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileStore::with_dir(temp_dir.path().join("prompts")).unwrap();
    let prompt = finished_prompt("q", &["a", "b"], 100);
    store.store_prompt(&prompt).unwrap();

    for index in 0..2 {
        let hash = prompt.hash(index).unwrap();
        assert!(temp_dir.path().join("prompts").join(format!("{hash}.json")).exists());
        let loaded = store.get_prompt(&hash).unwrap();
        assert_eq!(loaded.responses().len(), 2);
        assert_eq!(loaded.timestamp(), Some(100));
    }
    assert_eq!(store.hashes().unwrap().len(), 2);
}

#[test]
fn test_file_store_missing_and_prefix() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileStore::with_dir(temp_dir.path()).unwrap();
    assert!(matches!(
        store.get_prompt("0123"),
        Err(DevchatError::NotFound(_))
    ));

    let prompt = finished_prompt("q", &["a"], 100);
    store.store_prompt(&prompt).unwrap();
    let hash = prompt.hash(0).unwrap();
    assert_eq!(store.resolve_hash(&hash[..6]).unwrap(), hash);
}

#[test]
fn test_file_store_ignores_foreign_files() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("notes.txt"), "hello").unwrap();
    let store = FileStore::with_dir(temp_dir.path()).unwrap();

    assert!(store.hashes().unwrap().is_empty());
}
