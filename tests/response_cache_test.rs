//! Integration tests for the response cache

use std::sync::Arc;
use std::thread;

use kiln::cache::ResponseCache;
use kiln::common::{CacheKey, ServerError, FRAME_SIZE};

fn key(path: &str) -> CacheKey {
    CacheKey::new(path)
}

#[test]
fn test_install_lookup_round_trip() {
    let cache = ResponseCache::new(4, 2);

    cache.install(&key("/a.html"), b"HTTP/1.1 200 OK\r\n\r\nA").unwrap();

    let view = cache.lookup(&key("/a.html")).unwrap();
    assert_eq!(view.bytes(), b"HTTP/1.1 200 OK\r\n\r\nA");
}

#[test]
fn test_round_trip_truncates_to_frame_size() {
    let cache = ResponseCache::new(2, 2);
    let oversized = vec![0xAB; FRAME_SIZE * 2];

    cache.install(&key("/big"), &oversized).unwrap();

    let view = cache.lookup(&key("/big")).unwrap();
    assert_eq!(view.bytes(), &oversized[..FRAME_SIZE]);
}

#[test]
fn test_first_install_wins() {
    let cache = ResponseCache::new(4, 2);

    cache.install(&key("/page"), b"first").unwrap();
    cache.install(&key("/page"), b"second").unwrap();

    assert_eq!(cache.lookup(&key("/page")).unwrap().bytes(), b"first");
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_request_sequence_evicts_least_recently_touched() {
    // Mirrors serving GET /a, GET /b, GET /c against a two-frame cache:
    // the third install must evict /a, the least recently touched entry.
    let cache = ResponseCache::new(2, 2);

    cache.install(&key("/a.html"), b"A").unwrap();
    cache.install(&key("/b.html"), b"B").unwrap();
    cache.install(&key("/c.html"), b"C").unwrap();

    assert!(cache.lookup(&key("/a.html")).is_none());
    assert_eq!(cache.lookup(&key("/b.html")).unwrap().bytes(), b"B");
    assert_eq!(cache.lookup(&key("/c.html")).unwrap().bytes(), b"C");
}

#[test]
fn test_hits_protect_entries_from_eviction() {
    let cache = ResponseCache::new(2, 2);

    cache.install(&key("/a.html"), b"A").unwrap();
    cache.install(&key("/b.html"), b"B").unwrap();

    // Two hits on /a make /b the colder entry despite being newer.
    cache.lookup(&key("/a.html")).unwrap();
    cache.lookup(&key("/a.html")).unwrap();

    cache.install(&key("/c.html"), b"C").unwrap();

    assert!(cache.contains(&key("/a.html")));
    assert!(!cache.contains(&key("/b.html")));
}

#[test]
fn test_concurrent_installs_one_winner() {
    let cache = Arc::new(ResponseCache::new(4, 2));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                let payload = format!("writer {i}");
                cache.install(&key("/contended"), payload.as_bytes())
            })
        })
        .collect();

    for handle in handles {
        // A racer that finds every frame mid-fill gets CacheFull; that is
        // the abort-and-serve-uncached outcome, not a failure.
        match handle.join().unwrap() {
            Ok(()) | Err(ServerError::CacheFull) => {}
            Err(e) => panic!("unexpected install error: {e}"),
        }
    }

    // Exactly one entry exists, holding one writer's bytes in full.
    assert_eq!(cache.len(), 1);
    let view = cache.lookup(&key("/contended")).unwrap();
    let text = std::str::from_utf8(view.bytes()).unwrap();
    assert!(text.starts_with("writer "));

    // Losing fills returned their frames; nothing leaked.
    assert_eq!(cache.len() + cache.free_frames(), cache.frame_count());
}

#[test]
fn test_concurrent_reads_and_fills() {
    let cache = Arc::new(ResponseCache::new(8, 2));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..50 {
                    let k = key(&format!("/page-{}.html", (t + i) % 12));
                    match cache.lookup(&k) {
                        Some(view) => {
                            assert!(view.bytes().starts_with(b"body-"));
                        }
                        None => {
                            let body = format!("body-{}", k.as_str());
                            let _ = cache.install(&k, body.as_bytes());
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    // Frame accounting holds after the churn.
    assert_eq!(cache.len() + cache.free_frames(), cache.frame_count());
    assert!(cache.len() <= cache.frame_count());
}

#[test]
fn test_view_survives_eviction_of_its_entry() {
    let cache = ResponseCache::new(2, 2);

    cache.install(&key("/a.html"), b"A").unwrap();
    cache.install(&key("/b.html"), b"B").unwrap();

    let view = cache.lookup(&key("/b.html")).unwrap();

    // Evicting /a is unrelated; the held view still reads /b's bytes.
    cache.install(&key("/c.html"), b"C").unwrap();
    assert_eq!(view.bytes(), b"B");
}
