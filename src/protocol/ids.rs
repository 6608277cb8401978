//! ID schemes: `<prefix><24 lowercase hex chars>`.
//!
//! Every entity the gateway hands out an identifier for — responses,
//! messages, function calls, reasoning blocks, vector stores — uses the same
//! shape. Centralizing generation and validation here means the format is
//! expressed exactly once.

use rand::Rng;

/// Prefix for a [`crate::protocol::response::Response`] id.
pub const RESPONSE_PREFIX: &str = "resp_";
/// Prefix for a `message` item id.
pub const MESSAGE_PREFIX: &str = "msg_";
/// Prefix for a `function_call` item id.
pub const FUNCTION_CALL_PREFIX: &str = "fc_";
/// Prefix for a `function_call_output` item id.
pub const FUNCTION_CALL_OUTPUT_PREFIX: &str = "fco_";
/// Prefix for a `reasoning` item id.
pub const REASONING_PREFIX: &str = "rsn_";
/// Prefix for a `code_interpreter_call` item id.
pub const CODE_INTERPRETER_PREFIX: &str = "ci_";
/// Prefix for a vector store id (surfaced by a builtin tool provider).
pub const VECTOR_STORE_PREFIX: &str = "vs_";

/// Generates a new id of the form `<prefix><24 lowercase hex chars>`.
pub fn generate(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let mut hex = String::with_capacity(24);
    for _ in 0..24 {
        let nibble: u8 = rng.r#gen_range(0..16);
        hex.push(std::char::from_digit(nibble as u32, 16).expect("nibble is a valid hex digit"));
    }
    format!("{prefix}{hex}")
}

/// Validates that `id` matches `^<prefix>[0-9a-f]{24}$`.
pub fn is_valid(id: &str, prefix: &str) -> bool {
    match id.strip_prefix(prefix) {
        Some(rest) => rest.len() == 24 && rest.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()),
        None => false,
    }
}
