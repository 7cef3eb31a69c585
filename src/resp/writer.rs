//! RESP command serializer.
//!
//! Commands go on the wire as arrays of bulk strings:
//! `*<N>\r\n$<len>\r\narg1\r\n…`

use itoa::Buffer;

/// Append one command to `buf`.
pub fn write_command<A: AsRef<[u8]>>(buf: &mut Vec<u8>, args: &[A]) {
    let mut itoa_buf = Buffer::new();

    buf.push(b'*');
    buf.extend_from_slice(itoa_buf.format(args.len()).as_bytes());
    buf.extend_from_slice(b"\r\n");

    for arg in args {
        let arg = arg.as_ref();
        buf.push(b'$');
        buf.extend_from_slice(itoa_buf.format(arg.len()).as_bytes());
        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(arg);
        buf.extend_from_slice(b"\r\n");
    }
}

/// Encode a single command.
pub fn encode_command<A: AsRef<[u8]>>(args: &[A]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(encoded_len(args));
    write_command(&mut buf, args);
    buf
}

/// Encode many commands into one contiguous buffer (one write, one syscall).
pub fn encode_pipeline<A: AsRef<[u8]>>(commands: &[Vec<A>]) -> Vec<u8> {
    let cap = commands.iter().map(|c| encoded_len(c)).sum();
    let mut buf = Vec::with_capacity(cap);
    for args in commands {
        write_command(&mut buf, args);
    }
    buf
}

/// Upper-bound estimate of the encoded size.
fn encoded_len<A: AsRef<[u8]>>(args: &[A]) -> usize {
    // '*' / '$' + up to 20 digits + CRLF, plus payload + CRLF per arg
    23 + args.iter().map(|a| 23 + a.as_ref().len() + 2).sum::<usize>()
}

// ── Tests ──────────────────────────────────────────────────────────
