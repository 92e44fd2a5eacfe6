use petek_map::HashBucket;
use rand::Rng;
use std::sync::Arc;
use std::thread;

/// Probes from offset zero until the operation resolves or the table is
/// exhausted. This is the retry discipline the table itself leaves to its
/// callers.
fn probing_add(map: &HashBucket<u64, u64>, key: u64, value: u64) -> bool {
    for offset in 0..map.capacity() {
        match map.add(key, value, offset) {
            Ok(_) => return true,
            Err(err) if err.collision => continue,
            Err(_) => return false,
        }
    }
    false
}

fn probing_remove(map: &HashBucket<u64, u64>, key: u64) -> bool {
    for offset in 0..map.capacity() {
        if map.contains_key(&key, offset).is_some() && map.remove(&key, offset).is_some() {
            return true;
        }
    }
    false
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_mixed_workload_keeps_keys_unique() {
    let map: Arc<HashBucket<u64, u64>> = Arc::new(HashBucket::new(1024));
    let mut handles = vec![];

    for t in 0..8u64 {
        let map = map.clone();
        handles.push(thread::spawn(move || {
            let mut rng = rand::thread_rng();
            for _ in 0..1000 {
                // Each thread owns a disjoint key range, so every add is a
                // first insert or a duplicate of its own earlier one.
                let key = t * 64 + rng.gen_range(0..64);
                if rng.gen_bool(0.6) {
                    probing_add(&map, key, key);
                } else {
                    probing_remove(&map, key);
                }
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    // No key may occupy more than one slot.
    let mut keys: Vec<_> = map.keys().collect();
    let total = keys.len();
    keys.sort_unstable();
    keys.dedup();
    assert_eq!(keys.len(), total);
    assert_eq!(map.len(), total);

    for key in keys {
        let mut found = 0;
        for offset in 0..map.capacity() {
            if map.contains_key(&key, offset).is_some() {
                found += 1;
            }
        }
        assert_eq!(found, 1);
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_heavy_contention_on_one_key() {
    let map: Arc<HashBucket<u64, u64>> = Arc::new(HashBucket::new(64));
    let mut handles = vec![];

    for t in 0..8u64 {
        let map = map.clone();
        handles.push(thread::spawn(move || {
            for i in 0..2000 {
                let _ = map.set(0, t * 2000 + i, 0);
                let _ = map.get(&0, 0);
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    assert!(map.get(&0, 0).is_some());
    assert_eq!(map.len(), 1);
}
