//! Token arena: interned, length-tagged, aligned byte storage.
//!
//! Every piece of source text that survives tokenization lives in a single
//! growable byte buffer. Each token is stored as `[length: u32][bytes][NUL]`
//! with the whole record padded up to 4-byte alignment, and is referred to by
//! its byte offset wrapped in a [`TokenId`]. Offsets stay valid across arena
//! growth, so later passes store ids, never pointers. Records are immutable
//! once written and are never individually freed.
//!
//! Escape sequences (`\r \n \\ \" \xHH` and backslash-newline continuation)
//! are decoded only for double-quoted literals, at intern time.

use std::borrow::Cow;

/// Alignment of arena records, in bytes.
const ALIGNMENT: usize = 4;

/// Handle to a token stored in a [`TokenArena`].
///
/// The wrapped value is the byte offset of the record's length tag. Ids from
/// one arena must not be used with another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TokenId(u32);

impl TokenId {
    /// Returns the raw byte offset.
    #[inline]
    #[must_use]
    pub fn offset(self) -> usize {
        self.0 as usize
    }
}

/// Append-only interned token storage.
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
pub struct TokenArena {
    mem: Vec<u8>,
}

impl TokenArena {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes used by the arena, including tags, terminators and padding.
    #[must_use]
    pub fn memory_used(&self) -> usize {
        self.mem.len()
    }

    /// Interns a token verbatim.
    pub fn intern(&mut self, bytes: &[u8]) -> TokenId {
        let id = TokenId(self.mem.len() as u32);
        self.mem.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        self.mem.extend_from_slice(bytes);
        self.mem.push(0);
        self.pad();
        id
    }

    /// Interns a token from a string slice.
    pub fn intern_str(&mut self, s: &str) -> TokenId {
        self.intern(s.as_bytes())
    }

    /// Interns a double-quoted literal, decoding escape sequences.
    ///
    /// `line` is the enclosing line counter; it is incremented for every
    /// newline contained in the literal (escaped or raw) so diagnostics for
    /// the lines after a multi-line string stay correct.
    ///
    /// # Errors
    ///
    /// Returns a message for a lone `\` at the end of the literal, an
    /// incomplete `\x` sequence, or an unknown escape.
    pub fn intern_quoted(&mut self, bytes: &[u8], line: &mut u32) -> Result<TokenId, String> {
        let mut decoded = Vec::with_capacity(bytes.len());
        let mut pos = 0;
        while pos < bytes.len() {
            if bytes[pos] == b'\\' {
                if pos + 1 == bytes.len() {
                    return Err("lone escape char at end of string".to_owned());
                }
                pos += 1;
                match bytes[pos] {
                    b'r' => decoded.push(b'\r'),
                    b'n' => decoded.push(b'\n'),
                    b'\\' => decoded.push(b'\\'),
                    b'"' => decoded.push(b'"'),
                    b'\n' => {
                        // Escaped newline: the line continues, nothing is
                        // emitted. Multi-byte newlines count once.
                        if pos + 1 < bytes.len() && bytes[pos + 1] == b'\r' {
                            pos += 1;
                        }
                        *line += 1;
                    }
                    b'\r' => {
                        if pos + 1 < bytes.len() && bytes[pos + 1] == b'\n' {
                            pos += 1;
                        }
                    }
                    b'x' => {
                        if pos + 2 >= bytes.len() {
                            return Err("hex escape sequence at the end of string".to_owned());
                        }
                        let hex = std::str::from_utf8(&bytes[pos + 1..pos + 3])
                            .ok()
                            .and_then(|h| u8::from_str_radix(h, 16).ok())
                            .ok_or_else(|| "incomplete hex escape sequence".to_owned())?;
                        decoded.push(hex);
                        pos += 2;
                    }
                    other => {
                        return Err(format!("invalid escape sequence: \\{}", other as char));
                    }
                }
            } else {
                if bytes[pos] == b'\n' {
                    *line += 1;
                }
                decoded.push(bytes[pos]);
            }
            pos += 1;
        }
        Ok(self.intern(&decoded))
    }

    /// Length in bytes of the token's content.
    #[inline]
    #[must_use]
    pub fn len_of(&self, id: TokenId) -> usize {
        let off = id.offset();
        let tag: [u8; 4] = self.mem[off..off + 4].try_into().expect("token tag");
        u32::from_le_bytes(tag) as usize
    }

    /// The token's content bytes (without tag, terminator or padding).
    #[inline]
    #[must_use]
    pub fn bytes(&self, id: TokenId) -> &[u8] {
        let len = self.len_of(id);
        let start = id.offset() + 4;
        &self.mem[start..start + len]
    }

    /// The token's content as text, with invalid UTF-8 replaced.
    ///
    /// Tokens are arbitrary bytes (hex escapes can produce anything); this is
    /// for diagnostics, not for parsing.
    #[must_use]
    pub fn display(&self, id: TokenId) -> Cow<'_, str> {
        String::from_utf8_lossy(self.bytes(id))
    }

    /// The token's content as UTF-8 text, if it is valid UTF-8.
    #[must_use]
    pub fn as_str(&self, id: TokenId) -> Option<&str> {
        std::str::from_utf8(self.bytes(id)).ok()
    }

    /// Compares a token against a string literal. Length first, then bytes.
    #[inline]
    #[must_use]
    pub fn eq_str(&self, id: TokenId, s: &str) -> bool {
        self.bytes(id) == s.as_bytes()
    }

    /// Compares two tokens. Length first, then bytes.
    #[inline]
    #[must_use]
    pub fn eq_tokens(&self, a: TokenId, b: TokenId) -> bool {
        a == b || self.bytes(a) == self.bytes(b)
    }

    fn pad(&mut self) {
        while self.mem.len() % ALIGNMENT != 0 {
            self.mem.push(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_length_tagged_and_aligned() {
        let mut arena = TokenArena::new();
        let a = arena.intern(b"abc");
        let b = arena.intern(b"defgh");

        assert_eq!(arena.len_of(a), 3);
        assert_eq!(arena.bytes(a), b"abc");
        assert_eq!(arena.len_of(b), 5);
        assert_eq!(arena.bytes(b), b"defgh");
        // tag(4) + "abc"(3) + NUL(1) = 8, already aligned
        assert_eq!(b.offset(), 8);
        assert_eq!(arena.memory_used() % 4, 0);
    }

    #[test]
    fn growth_does_not_invalidate_ids() {
        let mut arena = TokenArena::new();
        let first = arena.intern(b"first");
        for i in 0..1000 {
            arena.intern(format!("tok{i}").as_bytes());
        }
        assert_eq!(arena.bytes(first), b"first");
    }

    #[test]
    fn quoted_decodes_escapes() {
        let mut arena = TokenArena::new();
        let mut line = 1;
        let id = arena.intern_quoted(br#"a\r\n\\\"\x41"#, &mut line).unwrap();
        assert_eq!(arena.bytes(id), b"a\r\n\\\"A");
        assert_eq!(line, 1);
    }

    #[test]
    fn quoted_newlines_bump_line_counter() {
        let mut arena = TokenArena::new();
        let mut line = 1;
        let id = arena.intern_quoted(b"a\nb\\\nc", &mut line).unwrap();
        // Raw newline is kept, escaped newline is removed; both count.
        assert_eq!(arena.bytes(id), b"a\nbc");
        assert_eq!(line, 3);
    }

    #[test]
    fn quoted_rejects_bad_escapes() {
        let mut arena = TokenArena::new();
        let mut line = 1;
        assert!(arena.intern_quoted(b"oops\\", &mut line).is_err());
        assert!(arena.intern_quoted(b"\\q", &mut line).is_err());
        assert!(arena.intern_quoted(b"\\x4", &mut line).is_err());
        assert!(arena.intern_quoted(b"\\xzz", &mut line).is_err());
    }

    #[test]
    fn token_comparison_is_by_content() {
        let mut arena = TokenArena::new();
        let a = arena.intern(b"same");
        let b = arena.intern(b"same");
        let c = arena.intern(b"other");
        assert!(arena.eq_tokens(a, b));
        assert!(!arena.eq_tokens(a, c));
        assert!(arena.eq_str(a, "same"));
        assert!(!arena.eq_str(c, "same "));
    }
}
