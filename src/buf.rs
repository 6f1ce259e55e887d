use std::io::{ErrorKind, Read};

/// Reads until `buf` is full or the reader is exhausted.
///
/// Returns `(eof, filled)`, `eof` is only set once a read came back empty.
pub fn fill_buf<R: Read>(data: &mut R, buf: &mut [u8]) -> std::io::Result<(bool, usize)> {
    let mut buf_read = 0;

    while buf_read < buf.len() {
        match data.read(&mut buf[buf_read..]) {
            Ok(0) => return Ok((true, buf_read)),
            Ok(x) => buf_read += x,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
    }
    Ok((false, buf_read))
}

#[cfg(test)]
mod test_fill_buf {
    use super::*;
    use std::io::Cursor;

    // Hands out one byte per read, interrupting every other call
    struct Trickle {
        data: Vec<u8>,
        calls: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.calls += 1;
            if self.calls % 2 == 0 {
                return Err(ErrorKind::Interrupted.into());
            }
            if self.data.is_empty() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.data.remove(0);
            Ok(1)
        }
    }

    #[test]
    fn short_reader() {
        let mut in_buf = Cursor::new(vec![1, 2]);
        let mut buf = [0u8; 4];

        assert_eq!(fill_buf(&mut in_buf, &mut buf).unwrap(), (true, 2));
        assert_eq!(&buf, &[1, 2, 0, 0]);
    }

    #[test]
    fn exact_fit_is_not_eof() {
        let mut in_buf = Cursor::new(vec![1, 2, 3, 4]);
        let mut buf = [0u8; 4];

        assert_eq!(fill_buf(&mut in_buf, &mut buf).unwrap(), (false, 4));
        assert_eq!(fill_buf(&mut in_buf, &mut buf).unwrap(), (true, 0));
    }

    #[test]
    fn empty_reader() {
        let mut in_buf = Cursor::new(Vec::<u8>::new());
        let mut buf = [0u8; 4];

        assert_eq!(fill_buf(&mut in_buf, &mut buf).unwrap(), (true, 0));
    }

    #[test]
    fn retries_interrupted_reads() {
        let mut in_buf = Trickle {
            data: vec![7, 8, 9],
            calls: 0,
        };
        let mut buf = [0u8; 2];

        assert_eq!(fill_buf(&mut in_buf, &mut buf).unwrap(), (false, 2));
        assert_eq!(&buf, &[7, 8]);
        assert_eq!(fill_buf(&mut in_buf, &mut buf).unwrap(), (true, 1));
        assert_eq!(buf[0], 9);
    }
}
