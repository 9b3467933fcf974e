use std::{
    fs,
    io::{self, BufReader, ErrorKind, Read, Write},
    path::Path,
    thread::{self, JoinHandle},
};

use crossbeam::channel::{Receiver, Sender};
use xz2::read::XzDecoder;

use crate::{error::TraceError, flags::OpFlags};

// Record Format: pc (u64 LE), mem_addr (u64 LE), flags (u8)
pub const RECORD_SIZE: usize = 8 + 8 + 1;

/// One executed instruction as reported by the functional simulator.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Step {
    pub pc: u64,
    /// Effective data address, 0 for non-memory instructions.
    pub mem_addr: u64,
    pub flags: OpFlags,
}

impl Step {
    fn decode(record: &[u8]) -> Step {
        let word = |at: usize| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&record[at..at + 8]);
            u64::from_le_bytes(bytes)
        };
        Step {
            pc: word(0),
            mem_addr: word(8),
            flags: OpFlags::from_bits_truncate(record[16]),
        }
    }

    fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut record = [0u8; RECORD_SIZE];
        record[0..8].copy_from_slice(&self.pc.to_le_bytes());
        record[8..16].copy_from_slice(&self.mem_addr.to_le_bytes());
        record[16] = self.flags.bits();
        record
    }
}

pub fn write_steps<W: Write>(mut out: W, steps: &[Step]) -> io::Result<()> {
    for step in steps {
        out.write_all(&step.encode())?;
    }
    out.flush()
}

/// Reads until `buf` is full or the stream ends.
fn fill_buf<R: Read>(stream: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

pub type StepBlock = Result<Vec<Step>, TraceError>;

pub struct Trace {
    pub rec: Receiver<StepBlock>,
    thread: Option<JoinHandle<()>>,
}

impl Trace {
    /// Opens a trace file, decompressing it when the name ends in `.xz`.
    pub fn read(
        path: &Path,
        instr_per_block: usize,
        blocks_per_queue: usize,
    ) -> Result<Trace, TraceError> {
        let file = fs::File::open(path)?;
        let stream: Box<dyn Read + Send> = if path.extension().is_some_and(|ext| ext == "xz") {
            Box::new(XzDecoder::new(file))
        } else {
            Box::new(BufReader::new(file))
        };
        Trace::from_reader(stream, instr_per_block, blocks_per_queue)
    }

    pub fn from_reader<R: Read + Send + 'static>(
        stream: R,
        instr_per_block: usize,
        blocks_per_queue: usize,
    ) -> Result<Trace, TraceError> {
        let instr_per_block = instr_per_block.max(1);
        let too_large = || TraceError::BufferTooLarge(instr_per_block);
        let len = instr_per_block
            .checked_mul(RECORD_SIZE)
            .ok_or_else(too_large)?;
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(len).map_err(|_| too_large())?;
        bytes.resize(len, 0u8);

        let (sender, receiver) = crossbeam::channel::bounded(blocks_per_queue);
        let t = thread::spawn(move || Trace::run_thread(stream, bytes, sender));

        Ok(Trace {
            rec: receiver,
            thread: Some(t),
        })
    }

    fn run_thread<R: Read>(mut stream: R, mut bytes: Vec<u8>, queue: Sender<StepBlock>) {
        loop {
            let block = match fill_buf(&mut stream, &mut bytes) {
                Ok(0) => return,
                Ok(n) if n % RECORD_SIZE != 0 => Err(TraceError::Truncated(n % RECORD_SIZE)),
                Ok(n) => Ok(bytes[..n]
                    .chunks_exact(RECORD_SIZE)
                    .map(Step::decode)
                    .collect()),
                Err(err) => Err(err.into()),
            };
            let failed = block.is_err();
            // A closed queue means the consumer is done with us.
            if queue.send(block).is_err() || failed {
                return;
            }
        }
    }
}

/// Yields blocks until the file is exhausted. A reader that died mid-stream
/// surfaces once as [`TraceError::ReaderGone`].
impl Iterator for Trace {
    type Item = StepBlock;

    fn next(&mut self) -> Option<StepBlock> {
        match self.rec.recv() {
            Ok(block) => Some(block),
            Err(_) => match self.thread.take()?.join() {
                Ok(()) => None,
                Err(_) => Some(Err(TraceError::ReaderGone)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn sample(n: u64) -> Vec<Step> {
        (0..n)
            .map(|i| Step {
                pc: 0x40_0000 + 8 * i,
                mem_addr: if i % 3 == 0 { 0x1000_0000 + i } else { 0 },
                flags: if i % 3 == 0 {
                    OpFlags::MEM | OpFlags::LOAD
                } else {
                    OpFlags::empty()
                },
            })
            .collect()
    }

    fn encoded(steps: &[Step]) -> Vec<u8> {
        let mut bytes = Vec::new();
        write_steps(&mut bytes, steps).unwrap();
        bytes
    }

    #[test]
    fn record_layout() {
        let step = Step {
            pc: 0x0102_0304_0506_0708,
            mem_addr: 0x10,
            flags: OpFlags::MEM | OpFlags::STORE,
        };
        let bytes = encoded(&[step]);
        assert_eq!(bytes.len(), RECORD_SIZE);
        assert_eq!(bytes[0], 0x08);
        assert_eq!(bytes[7], 0x01);
        assert_eq!(bytes[8], 0x10);
        assert_eq!(bytes[16], 0b101);
    }

    #[test]
    fn blocks_preserve_order() {
        let steps = sample(10);
        let trace = Trace::from_reader(Cursor::new(encoded(&steps)), 4, 2).unwrap();
        let blocks: Vec<_> = trace.map(Result::unwrap).collect();
        assert_eq!(
            blocks.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![4, 4, 2]
        );
        assert_eq!(blocks.concat(), steps);
    }

    #[test]
    fn empty_trace_has_no_blocks() {
        let mut trace = Trace::from_reader(Cursor::new(Vec::new()), 4, 2).unwrap();
        assert!(trace.next().is_none());
    }

    #[test]
    fn partial_record_is_an_error() {
        let mut bytes = encoded(&sample(2));
        bytes.truncate(RECORD_SIZE + 5);
        let mut trace = Trace::from_reader(Cursor::new(bytes), 16, 2).unwrap();
        assert!(matches!(trace.next(), Some(Err(TraceError::Truncated(5)))));
        assert!(trace.next().is_none());
    }

    #[test]
    fn oversized_block_is_rejected() {
        let bytes = encoded(&sample(10));
        assert!(matches!(
            Trace::from_reader(Cursor::new(bytes.clone()), usize::MAX, 2),
            Err(TraceError::BufferTooLarge(usize::MAX))
        ));
        assert!(matches!(
            Trace::from_reader(Cursor::new(bytes), usize::MAX / RECORD_SIZE, 2),
            Err(TraceError::BufferTooLarge(_))
        ));
    }

    struct FailingDisk;

    impl Read for FailingDisk {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            panic!("disk controller fell over");
        }
    }

    #[test]
    fn dead_reader_is_reported() {
        let mut trace = Trace::from_reader(FailingDisk, 4, 2).unwrap();
        assert!(matches!(trace.next(), Some(Err(TraceError::ReaderGone))));
        assert!(trace.next().is_none());
    }

    #[test]
    fn reads_plain_and_xz_files() {
        let steps = sample(50);
        let dir = tempfile::tempdir().unwrap();

        let plain = dir.path().join("prog.trace");
        fs::write(&plain, encoded(&steps)).unwrap();

        let packed = dir.path().join("prog.trace.xz");
        let mut encoder = xz2::write::XzEncoder::new(fs::File::create(&packed).unwrap(), 6);
        write_steps(&mut encoder, &steps).unwrap();
        encoder.finish().unwrap();

        for path in [plain, packed] {
            let trace = Trace::read(&path, 16, 4).unwrap();
            let read: Vec<Step> = trace.map(Result::unwrap).flatten().collect();
            assert_eq!(read, steps);
        }
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Trace::read(&dir.path().join("nope"), 16, 4),
            Err(TraceError::Io(_))
        ));
    }
}
