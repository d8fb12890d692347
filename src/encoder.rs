//! Package encoding, the write-side counterpart to [`crate::filter`].

use bytes::BufMut;

/// Serializes a package of type `P` into an outbound byte writer.
///
/// Implementations must not retain `writer` past the call; the sender
/// facade only guarantees it is valid for the duration of `encode`.
pub trait PackageEncoder<P> {
    /// Write the encoded form of `pkg` into `writer`, returning the number
    /// of bytes written.
    fn encode(&mut self, writer: &mut dyn BufMut, pkg: &P) -> usize;

    /// Upper-bound-ish estimate of how many bytes `encode` will need for
    /// `pkg`, reserved in the outbound pipe before `encode` runs. Defaults
    /// to a generic chunk size; protocols with a cheap, accurate size
    /// (e.g. a fixed header plus `pkg`'s own length) should override this
    /// so `Sender::send_encoded` respects pipe-capacity backpressure the
    /// same way `Sender::send_bytes` does, instead of reserving a sliver
    /// and growing past capacity as it writes.
    fn size_hint(&self, pkg: &P) -> usize {
        let _ = pkg;
        256
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct LineEncoder;

    impl PackageEncoder<String> for LineEncoder {
        fn encode(&mut self, writer: &mut dyn BufMut, pkg: &String) -> usize {
            writer.put_slice(pkg.as_bytes());
            writer.put_u8(b'\n');
            pkg.len() + 1
        }
    }

    #[test]
    fn encodes_with_trailing_newline() {
        let mut buf = Vec::new();
        let mut encoder = LineEncoder;
        let written = encoder.encode(&mut buf, &"hello".to_string());
        assert_eq!(written, 6);
        assert_eq!(buf, b"hello\n");
    }
}
