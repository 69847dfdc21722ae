use std::io::{self, Read};
use thiserror::Error;

/// Size of the chunks two streams are compared in.
pub const CHUNK_SIZE: usize = 16;

#[derive(Error, Debug)]
pub enum Error {
    #[error("chunk {index} differs: expected {expected:?}, got {actual:?}")]
    ChunkMismatch {
        index: usize,
        expected: Vec<u8>,
        actual: Vec<u8>,
    },
    #[error("cannot read stream: {0}")]
    Io(#[from] io::Error),
}

/// Compares two byte streams chunk by chunk.
///
/// Each side is read until a chunk of [CHUNK_SIZE] bytes is full or the stream ends, so
/// readers that return short reads, or need one more call returning `0` before they report
/// end of stream, compare equal to readers that do not. Streams of different length or
/// content never compare equal.
///
/// Known smell: the tolerance for the extra end-of-stream read hides readers that disagree
/// on when they are exhausted. It is kept because callers rely on it.
pub fn compare_streams<E, A>(mut expected: E, mut actual: A) -> Result<(), Error>
where
    E: Read,
    A: Read,
{
    let mut expected_buf = [0u8; CHUNK_SIZE];
    let mut actual_buf = [0u8; CHUNK_SIZE];

    let mut index = 0;
    loop {
        let expected_len = read_chunk(&mut expected, &mut expected_buf)?;
        let actual_len = read_chunk(&mut actual, &mut actual_buf)?;

        if expected_buf[..expected_len] != actual_buf[..actual_len] {
            return Err(Error::ChunkMismatch {
                index,
                expected: expected_buf[..expected_len].to_vec(),
                actual: actual_buf[..actual_len].to_vec(),
            });
        }

        // Both sides are exhausted at the same point.
        if expected_len < CHUNK_SIZE {
            return Ok(());
        }

        index += 1;
    }
}

fn read_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}
