//! Synthetic decoder sources for the benchmarks.

use std::fmt::Write;

/// A program of `count` groups of declarations, each with a struct, a method
/// looping over a slice field, a clamp and a call with a precondition.
pub fn sample(count: usize) -> String {
    let mut out = String::from("const MAX_CHUNK: u32 = 4096\n");
    for n in 0..count {
        _ = write!(
            out,
            "
struct chunk{n}(
    size: u32[..MAX_CHUNK],
    pos: u64,
    body: []u8,
)

func chunk{n}.find(limit: u64) -> u64,
    pre limit <= this.body.len(),
    post result <= limit,
{{
    var i: u64 = 0
    while i < limit, inv i <= limit {{
        if this.body[i] == 0 {{
            break
        }}
        i += 1
    }}
    return i
}}

func clamp{n}(x: u32) -> u32[..MAX_CHUNK] {{
    if x > MAX_CHUNK {{
        return MAX_CHUNK
    }}
    return x
}}

func peek{n}(s: []u8, at: u64) -> u8, pre at < s.len() {{
    return s[at]
}}

func first{n}(s: []u8) -> u8, pre s.len() >= 2 {{
    var a: u8 = peek{n}(s, 0)
    var b: u8 = peek{n}(s, 1)
    if a > 100 {{
        return a - 100
    }}
    return a | b
}}
"
        );
    }
    out
}
