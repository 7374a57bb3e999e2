//! Prefix-search regression harness.
//!
//! Takes one positional argument selecting the engine: `1` for the tail
//! trie, anything else for the two-trie. Inserts a small dictionary and
//! prints the prefix-search results for every prefix of `back!`.

use aoetrie::{create_trie, TrieKind};

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        println!("{} trie_type(1 = single, * = double)", args[0]);
        return;
    }

    let kind = if args[1].starts_with('1') {
        TrieKind::SingleTrie
    } else {
        TrieKind::DoubleTrie
    };
    let mut trie = create_trie(kind, 0);

    let dict: [&[u8]; 7] = [
        b"bachelor", b"back", b"badge", b"badger", b"badness", b"bcs", b"backbone",
    ];
    for (i, word) in dict.iter().enumerate() {
        trie.insert(word, i as i32 + 1).expect("insert failed");
    }

    let prefix = b"back!";
    for len in 0..=prefix.len() {
        let store = &prefix[..len];
        println!("== Searching {} ==", String::from_utf8_lossy(store));
        for (key, value) in trie.prefix_search(store) {
            println!("{} = {}", String::from_utf8_lossy(&key), value);
        }
    }
    println!("== Done ==");
}
