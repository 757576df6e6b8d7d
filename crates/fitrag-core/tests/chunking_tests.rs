use std::fs;
use tempfile::TempDir;

use fitrag_core::chunking::{approximate_token_length, chunk_paragraphs, collect_text, Chunker, ChunkingConfig, Corpus};
use fitrag_core::Error;

fn words(n: usize, tag: &str) -> String {
    (0..n).map(|i| format!("{}{}", tag, i)).collect::<Vec<_>>().join(" ")
}

#[test]
fn token_estimate_is_at_least_one_and_monotonic() {
    assert_eq!(approximate_token_length(""), 1);
    assert_eq!(approximate_token_length("   \n "), 1);
    assert_eq!(approximate_token_length("one"), 1);
    assert_eq!(approximate_token_length("a b c"), 4);
    assert_eq!(approximate_token_length("운동 처방 지침 exercise"), 5);
    let mut last = 0;
    for n in 0..200 {
        let est = approximate_token_length(&words(n, "w"));
        assert!(est >= 1);
        assert!(est >= last, "estimate decreased at {} words", n);
        last = est;
    }
}

#[test]
fn collect_text_walks_pages_and_normalizes() {
    let corpus: Corpus = serde_json::from_str(
        r#"{"pages": [
            {"items": [{"md": "Title\n\n\n\nBody"}, {"value": "  value only  "}, {"md": "   "}]},
            {"items": []},
            {"items": [{"md": null, "value": "third"}, {"type": "image"}]}
        ]}"#,
    )
    .unwrap();
    assert_eq!(collect_text(&corpus), vec!["Title\n\nBody", "value only", "third"]);
    let empty: Corpus = serde_json::from_str("{}").unwrap();
    assert!(collect_text(&empty).is_empty());
}

#[test]
fn four_equal_paragraphs_with_small_overlap() {
    // three words -> estimate 4
    let paras: Vec<String> = ["p1", "p2", "p3", "p4"].iter().map(|t| words(3, t)).collect();
    assert!(paras.iter().all(|p| approximate_token_length(p) == 4));
    let chunks = chunk_paragraphs(&paras, 10, 3);
    assert_eq!(chunks, vec![format!("{}\n\n{}", paras[0], paras[1]), format!("{}\n\n{}", paras[2], paras[3])]);
}

#[test]
fn overlap_carries_tail_paragraphs_into_next_chunk() {
    let paras = vec![words(3, "a"), words(3, "b"), words(3, "c")];
    // budget 8 fits two paragraphs; overlap 4 keeps exactly one
    let chunks = chunk_paragraphs(&paras, 8, 4);
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0], format!("{}\n\n{}", paras[0], paras[1]));
    assert_eq!(chunks[1], format!("{}\n\n{}", paras[1], paras[2]));
}

#[test]
fn empty_input_yields_no_chunks() {
    let none: Vec<String> = Vec::new();
    assert!(chunk_paragraphs(&none, 700, 150).is_empty());
}

#[test]
fn oversized_paragraph_is_kept_whole() {
    let big = words(100, "big");
    let paras = vec![words(2, "x"), big.clone(), words(2, "y")];
    let chunks = chunk_paragraphs(&paras, 10, 0);
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[1], big);
}

#[test]
fn chunks_preserve_paragraph_order_and_respect_budget() {
    let sizes = [1usize, 7, 3, 12, 2, 2, 9, 5, 1, 30, 4, 6, 6, 2];
    let paras: Vec<String> = sizes.iter().enumerate().map(|(i, n)| words(*n, &format!("p{}_", i))).collect();
    for (max_tokens, overlap) in [(10, 0), (10, 3), (20, 8), (40, 15), (700, 150)] {
        let chunks = chunk_paragraphs(&paras, max_tokens, overlap);
        let mut next = 0usize;
        for chunk in &chunks {
            let members: Vec<&str> = chunk.split("\n\n").collect();
            let first = paras.iter().position(|p| p == members[0]).expect("chunk starts with a source paragraph");
            assert!(first <= next, "chunk skips a paragraph");
            for (offset, m) in members.iter().enumerate() {
                assert_eq!(*m, paras[first + offset], "paragraphs out of order");
            }
            next = first + members.len();
            let total: usize = members.iter().map(|m| approximate_token_length(m)).sum();
            let largest = members.iter().map(|m| approximate_token_length(m)).max().unwrap_or(0);
            assert!(total <= max_tokens + largest, "chunk of {} tokens exceeds {} by more than one paragraph", total, max_tokens);
        }
        assert_eq!(next, paras.len(), "every paragraph is covered");
    }
}

#[test]
fn custom_estimator_is_honoured() {
    fn chars(s: &str) -> usize {
        s.chars().count().max(1)
    }
    let chunker = Chunker::new(ChunkingConfig { max_tokens: 5, overlap_tokens: 0 }).with_estimator(chars);
    assert_eq!(chunker.chunk(&["ab", "cd", "ef"]), vec!["ab\n\ncd", "ef"]);
}

#[test]
fn process_file_reports_missing_source() {
    let tmp = TempDir::new().unwrap();
    let err = Chunker::default().process_file(&tmp.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, Error::MissingSource(_)));
}

#[test]
fn process_file_numbers_chunks_in_order() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("acsm.json");
    fs::write(&path, r#"{"pages": [{"items": [{"md": "alpha beta"}, {"md": "gamma"}, {"value": "delta epsilon zeta"}]}]}"#).unwrap();
    let chunker = Chunker::new(ChunkingConfig { max_tokens: 4, overlap_tokens: 0 });
    let chunks = chunker.process_file(&path).unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].id, 0);
    assert_eq!(chunks[0].text, "alpha beta\n\ngamma");
    assert_eq!(chunks[1].id, 1);
    assert_eq!(chunks[1].text, "delta epsilon zeta");
}
