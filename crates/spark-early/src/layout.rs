//! 记录在竞技场中的二进制布局。
//!
//! ```text
//! offset+0   meta       bit 63       COMPLETE（最后写入，Release）
//!                       bit 62       PADDING（容量边界上竞争落败者留下的填充）
//!                       bits 32..61  负载字节数
//!                       bits  0..31  预留的记录字节数
//! offset+8   timestamp  u64 纳秒
//! offset+16  payload    小端打包进 u64 字，尾部补零
//! ```
//!
//! 竞技场以 `AtomicU64` 字为单位存储，因此对齐粒度就是头部的自然对齐（8 字节），
//! 在禁止非对齐访问的体系结构上同样安全，且全程无需 `unsafe`。

use core::fmt;

use crate::sync::{AtomicU64, Ordering};

/// 单个竞技场字的字节数，也是记录的对齐粒度。
pub const WORD_BYTES: usize = 8;

/// 记录头（meta + timestamp）的字节数。
pub const HEADER_BYTES: usize = 2 * WORD_BYTES;

/// 记录头可描述的最大竞技场容量。
pub const MAX_CAPACITY_BYTES: usize = (u32::MAX as usize) & !(WORD_BYTES - 1);

/// 单条记录负载的上限。
pub const MAX_PAYLOAD_BYTES: usize = (1 << 30) - 1;

const COMPLETE: u64 = 1 << 63;
const PADDING: u64 = 1 << 62;
const LEN_SHIFT: u32 = 32;
const LEN_MASK: u64 = MAX_PAYLOAD_BYTES as u64;
const SIZE_MASK: u64 = u32::MAX as u64;

/// 向上取整到对齐粒度；溢出时返回 `None`。
pub(crate) const fn align_up(bytes: usize) -> Option<usize> {
    match bytes.checked_add(WORD_BYTES - 1) {
        Some(padded) => Some(padded & !(WORD_BYTES - 1)),
        None => None,
    }
}

/// 负载长度为 `payload_len` 的记录所需的字节数；超过 [`MAX_PAYLOAD_BYTES`] 时返回 `None`。
pub fn record_size(payload_len: usize) -> Option<usize> {
    if payload_len > MAX_PAYLOAD_BYTES {
        return None;
    }
    align_up(payload_len + HEADER_BYTES)
}

/// 已发布槽位的头部视图：一条记录，或一段应当跳过的填充。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    pub(crate) record_size: usize,
    pub(crate) payload_len: usize,
    pub(crate) padding: bool,
}

impl Header {
    pub(crate) fn record(record_size: usize, payload_len: usize) -> Self {
        Self {
            record_size,
            payload_len,
            padding: false,
        }
    }

    pub(crate) fn padding(size: usize) -> Self {
        Self {
            record_size: size,
            payload_len: 0,
            padding: true,
        }
    }

    pub(crate) fn encode(self) -> u64 {
        let kind = if self.padding { PADDING } else { 0 };
        COMPLETE
            | kind
            | ((self.payload_len as u64 & LEN_MASK) << LEN_SHIFT)
            | (self.record_size as u64 & SIZE_MASK)
    }

    /// 解码 meta 字；未设置 COMPLETE 时返回 `None`。
    pub(crate) fn decode(meta: u64) -> Option<Self> {
        if meta & COMPLETE == 0 {
            return None;
        }
        Some(Self {
            record_size: (meta & SIZE_MASK) as usize,
            payload_len: ((meta >> LEN_SHIFT) & LEN_MASK) as usize,
            padding: meta & PADDING != 0,
        })
    }
}

/// 将字节流打包写入一段独占的竞技场字。
///
/// 写入只使用 `Relaxed`：这些字由 fetch-and-add 预留给当前调用独占，
/// 可见性由随后以 `Release` 发布的 meta 字（以及交接门的锁）保证。
/// 超出 `limit` 的输出被截断在 `char` 边界上，负载因此始终是合法 UTF-8。
pub(crate) struct WordWriter<'a> {
    words: &'a [AtomicU64],
    limit: usize,
    written: usize,
    pending: u64,
}

impl<'a> WordWriter<'a> {
    pub(crate) fn new(words: &'a [AtomicU64], limit: usize) -> Self {
        Self {
            words,
            limit,
            written: 0,
            pending: 0,
        }
    }

    fn push_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            let lane = self.written % WORD_BYTES;
            self.pending |= u64::from(byte) << (lane * 8);
            self.written += 1;
            if lane == WORD_BYTES - 1 {
                self.flush_word();
            }
        }
    }

    fn flush_word(&mut self) {
        let index = (self.written - 1) / WORD_BYTES;
        if let Some(word) = self.words.get(index) {
            word.store(self.pending, Ordering::Relaxed);
        }
        self.pending = 0;
    }

    /// 刷出最后一个不满的字，返回实际写入的负载字节数。
    pub(crate) fn finish(mut self) -> usize {
        if self.written % WORD_BYTES != 0 {
            self.flush_word();
        }
        self.written
    }
}

impl fmt::Write for WordWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = self.limit - self.written;
        if s.len() <= room {
            self.push_bytes(s.as_bytes());
            return Ok(());
        }
        let mut cut = room;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        self.push_bytes(&s.as_bytes()[..cut]);
        // 截断不视为格式化失败：预留已经发生，记录必须照常发布。
        self.limit = self.written;
        Ok(())
    }
}

/// 只统计长度、不落地字节的 `fmt::Write`，用于格式化记录的第一遍测量。
#[derive(Default)]
pub(crate) struct LengthCounter {
    pub(crate) len: usize,
}

impl fmt::Write for LengthCounter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.len = self.len.saturating_add(s.len());
        Ok(())
    }
}

/// 从竞技场字中拷贝出 `len` 个负载字节。
pub(crate) fn read_payload(words: &[AtomicU64], len: usize, out: &mut alloc::vec::Vec<u8>) {
    out.clear();
    out.reserve(len);
    for word in words {
        let remaining = len - out.len();
        if remaining == 0 {
            break;
        }
        let bytes = word.load(Ordering::Relaxed).to_le_bytes();
        out.extend_from_slice(&bytes[..remaining.min(WORD_BYTES)]);
    }
}
