use crate::error::{PeelError, Result};
use crate::util::bits::{BitSource, MsbReader};

const TAG: &str = "sit15";

const PRECISION: u32 = 1 << 25;
const RENORM: u32 = 1 << 24;

/// Block derandomization offsets, shared with bzip2.
#[rustfmt::skip]
const RAND: [u16; 256] = [
    619, 720, 127, 481, 931, 816, 813, 233, 566, 247,
    985, 724, 205, 454, 863, 491, 741, 242, 949, 214,
    733, 859, 335, 708, 621, 574,  73, 654, 730, 472,
    419, 436, 278, 496, 867, 210, 399, 680, 480,  51,
    878, 465, 811, 169, 869, 675, 611, 697, 867, 561,
    862, 687, 507, 283, 482, 129, 807, 591, 733, 623,
    150, 238,  59, 379, 684, 877, 625, 169, 643, 105,
    170, 607, 520, 932, 727, 476, 693, 425, 174, 647,
     73, 122, 335, 530, 442, 853, 695, 249, 445, 515,
    909, 545, 703, 919, 874, 474, 882, 500, 594, 612,
    641, 801, 220, 162, 819, 984, 589, 513, 495, 799,
    161, 604, 958, 533, 221, 400, 386, 867, 600, 782,
    382, 596, 414, 171, 516, 375, 682, 485, 911, 276,
     98, 553, 163, 354, 666, 933, 424, 341, 533, 870,
    227, 730, 475, 186, 263, 647, 537, 686, 600, 224,
    469,  68, 770, 919, 190, 373, 294, 822, 808, 206,
    184, 943, 795, 384, 383, 461, 404, 758, 839, 887,
    715,  67, 618, 276, 204, 918, 873, 777, 604, 560,
    951, 160, 578, 722,  79, 804,  96, 409, 713, 940,
    652, 934, 970, 447, 318, 353, 859, 672, 112, 785,
    645, 863, 803, 350, 139,  93, 354,  99, 820, 908,
    609, 772, 154, 274, 580, 184,  79, 626, 630, 742,
    653, 282, 762, 623, 680,  81, 927, 626, 789, 125,
    411, 521, 938, 300, 821,  78, 343, 175, 128, 250,
    170, 774, 972, 275, 999, 639, 495,  78, 352, 126,
    857, 956, 358, 619, 580, 124,
];

/// Adaptive frequency table. `update` bumps the decoded symbol and halves
/// everything (rounding up, so no frequency reaches zero) once the total
/// passes the limit.
struct Model {
    freqs: Vec<u32>,
    total: u32,
    increment: u32,
    limit: u32,
    first: u16,
}

impl Model {
    fn new(first: u16, last: u16, increment: u32, limit: u32) -> Model {
        let n = usize::from(last - first) + 1;
        Model {
            freqs: vec![increment; n],
            total: increment * n as u32,
            increment,
            limit,
            first,
        }
    }

    fn reset(&mut self) {
        for f in &mut self.freqs {
            *f = self.increment;
        }
        self.total = self.increment * self.freqs.len() as u32;
    }

    fn update(&mut self, k: usize) {
        self.freqs[k] += self.increment;
        self.total += self.increment;
        if self.total > self.limit {
            self.total = 0;
            for f in &mut self.freqs {
                *f = (*f + 1) >> 1;
                self.total += *f;
            }
        }
    }
}

/// 26-bit adaptive arithmetic decoder over an MSB-first raw bitstream.
struct ArithDecoder<'a> {
    bits: MsbReader<'a>,
    range: u32,
    code: u32,
}

impl<'a> ArithDecoder<'a> {
    fn new(mut bits: MsbReader<'a>) -> Result<Self> {
        let hi = bits.read_bits(13)?;
        let lo = bits.read_bits(13)?;
        Ok(ArithDecoder {
            bits,
            range: PRECISION,
            code: (hi << 13) | lo,
        })
    }

    fn decode(&mut self, model: &mut Model) -> Result<u16> {
        let scale = self.range / model.total;
        if scale == 0 {
            return Err(PeelError::decode(TAG, "zero arithmetic range".to_string()));
        }
        let target = self.code / scale;

        let mut cum = 0u32;
        let mut k = 0usize;
        while k + 1 < model.freqs.len() && cum + model.freqs[k] <= target {
            cum += model.freqs[k];
            k += 1;
        }

        self.code -= scale * cum;
        if cum + model.freqs[k] == model.total {
            self.range -= scale * cum;
        } else {
            self.range = model.freqs[k] * scale;
        }

        while self.range <= RENORM {
            self.range <<= 1;
            self.code = (self.code << 1) | self.bits.read_bit()?;
        }

        model.update(k);
        Ok(model.first + k as u16)
    }

    /// Multi-bit fields assemble from single coded bits, low bit first.
    fn decode_bits(&mut self, model: &mut Model, n: u32) -> Result<u32> {
        let mut v = 0u32;
        for i in 0..n {
            v |= u32::from(self.decode(model)?) << i;
        }
        Ok(v)
    }
}

struct Mtf([u8; 256]);

impl Mtf {
    fn new() -> Mtf {
        let mut t = [0u8; 256];
        for (i, slot) in t.iter_mut().enumerate() {
            *slot = i as u8;
        }
        Mtf(t)
    }

    fn decode(&mut self, index: usize) -> u8 {
        let b = self.0[index];
        self.0.copy_within(0..index, 1);
        self.0[0] = b;
        b
    }
}

/// LF-mapping for the inverse transform: `lf[j]` is the position in the
/// block buffer whose successor row is j.
fn build_lf(buf: &[u8], lf: &mut Vec<u32>) {
    let mut counts = [0u32; 256];
    for &b in buf {
        counts[usize::from(b)] += 1;
    }
    let mut base = [0u32; 256];
    let mut sum = 0u32;
    for (i, &c) in counts.iter().enumerate() {
        base[i] = sum;
        sum += c;
    }
    lf.clear();
    lf.resize(buf.len(), 0);
    let mut seen = [0u32; 256];
    for (i, &b) in buf.iter().enumerate() {
        let b = usize::from(b);
        lf[(base[b] + seen[b]) as usize] = i as u32;
        seen[b] += 1;
    }
}

/// Streams derandomized post-BWT bytes, decoding a fresh block whenever the
/// current one is exhausted. Block and LF buffers are allocated once and
/// reused across blocks.
struct BlockReader<'a> {
    ac: ArithDecoder<'a>,
    primary: Model,
    selector: Model,
    groups: [Model; 7],
    index_bits: u32,
    block_size: usize,
    eos: bool,
    buf: Vec<u8>,
    lf: Vec<u32>,
    idx: usize,
    produced: usize,
    randomized: bool,
    rand_ti: usize,
    rand_next: usize,
}

impl<'a> BlockReader<'a> {
    fn new(src: &'a [u8]) -> Result<Self> {
        let bits = MsbReader::new(src, TAG);
        let mut ac = ArithDecoder::new(bits)?;
        // the primary model carries every header and footer field and is
        // never reset
        let mut primary = Model::new(0, 1, 1, 256);

        let magic_a = ac.decode_bits(&mut primary, 8)?;
        let magic_s = ac.decode_bits(&mut primary, 8)?;
        if magic_a != u32::from(b'A') || magic_s != u32::from(b's') {
            return Err(PeelError::format(TAG, "not an Arsenic stream"));
        }
        let exponent = ac.decode_bits(&mut primary, 4)?;
        let block_size = 1usize << (exponent + 9);
        let eos = ac.decode_bits(&mut primary, 1)? == 1;

        Ok(BlockReader {
            ac,
            primary,
            selector: Model::new(0, 10, 8, 1024),
            groups: [
                Model::new(2, 3, 8, 1024),
                Model::new(4, 7, 4, 1024),
                Model::new(8, 15, 4, 1024),
                Model::new(16, 31, 4, 1024),
                Model::new(32, 63, 2, 1024),
                Model::new(64, 127, 2, 1024),
                Model::new(128, 255, 1, 1024),
            ],
            index_bits: exponent + 9,
            block_size,
            eos,
            buf: Vec::with_capacity(block_size),
            lf: Vec::new(),
            idx: 0,
            produced: 0,
            randomized: false,
            rand_ti: 0,
            rand_next: 0,
        })
    }

    fn push_block_byte(&mut self, b: u8) -> Result<()> {
        if self.buf.len() >= self.block_size {
            return Err(PeelError::decode(TAG, "block buffer overflow".to_string()));
        }
        self.buf.push(b);
        Ok(())
    }

    fn read_block(&mut self) -> Result<()> {
        self.selector.reset();
        for g in &mut self.groups {
            g.reset();
        }
        let mut mtf = Mtf::new();

        self.randomized = self.ac.decode_bits(&mut self.primary, 1)? == 1;
        let primary_index = self.ac.decode_bits(&mut self.primary, self.index_bits)? as usize;

        self.buf.clear();
        loop {
            let mut sel = self.ac.decode(&mut self.selector)?;
            if sel < 2 {
                // zero run: bit-weighted selector digits accumulate the
                // repeat count for the byte at the front of the MTF table
                let mut total = 0usize;
                let mut p = 0u32;
                while sel < 2 {
                    total += (usize::from(sel) + 1) << p;
                    p += 1;
                    sel = self.ac.decode(&mut self.selector)?;
                }
                let b = mtf.decode(0);
                for _ in 0..total {
                    self.push_block_byte(b)?;
                }
            }
            match sel {
                10 => break,
                2 => {
                    let b = mtf.decode(1);
                    self.push_block_byte(b)?;
                }
                3..=9 => {
                    let group = usize::from(sel) - 3;
                    let sym = self.ac.decode(&mut self.groups[group])?;
                    let b = mtf.decode(usize::from(sym));
                    self.push_block_byte(b)?;
                }
                _ => unreachable!("selector range is 0..=10"),
            }
        }

        // footer: models go back to their initial state, then the stream
        // says whether another block follows
        self.selector.reset();
        for g in &mut self.groups {
            g.reset();
        }
        self.eos = self.ac.decode_bits(&mut self.primary, 1)? == 1;
        if self.eos {
            // stored CRC of the whole stream; integrity here is the
            // container's concern, so it is read and dropped
            let _ = self.ac.decode_bits(&mut self.primary, 32)?;
        }

        if !self.buf.is_empty() && primary_index >= self.buf.len() {
            return Err(PeelError::decode(
                TAG,
                "BWT primary index out of bounds".to_string(),
            ));
        }
        build_lf(&self.buf, &mut self.lf);
        self.idx = primary_index;
        self.produced = 0;
        self.rand_ti = 0;
        self.rand_next = usize::from(RAND[0]);
        Ok(())
    }

    fn next(&mut self) -> Result<u8> {
        while self.produced == self.buf.len() {
            if self.eos {
                return Err(PeelError::Truncated(TAG));
            }
            self.read_block()?;
        }
        let i = self.lf[self.idx] as usize;
        if i >= self.buf.len() {
            return Err(PeelError::decode(TAG, "BWT index out of bounds".to_string()));
        }
        self.idx = i;
        let mut b = self.buf[i];
        if self.randomized && self.produced == self.rand_next {
            b ^= 1;
            self.rand_ti = (self.rand_ti + 1) & 0xFF;
            self.rand_next += usize::from(RAND[self.rand_ti]);
        }
        self.produced += 1;
        Ok(b)
    }
}

/// Trailing run expansion: four equal bytes are followed by an extension
/// count, with a zero count discarded outright.
fn rle_expand(mut fetch: impl FnMut() -> Result<u8>, out_len: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(out_len);
    let mut prev = 0u8;
    let mut streak = 0u32;
    let mut repeat = 0usize;

    while out.len() < out_len {
        if repeat > 0 {
            out.push(prev);
            repeat -= 1;
            continue;
        }
        let b = fetch()?;
        if streak == 4 {
            streak = 0;
            if b == 0 {
                continue;
            }
            repeat = usize::from(b) - 1;
            out.push(prev);
            continue;
        }
        if b == prev {
            streak += 1;
        } else {
            prev = b;
            streak = 1;
        }
        out.push(b);
    }
    Ok(out)
}

/// StuffIt compression method 15 ("Arsenic"): BWT + MTF + adaptive
/// arithmetic coding, finished by a byte-run expansion. The fork CRC is not
/// consulted for this method; the stream carries its own.
pub fn decode(src: &[u8], out_len: usize) -> Result<Vec<u8>> {
    let mut reader = BlockReader::new(src)?;
    rle_expand(|| reader.next(), out_len)
}
