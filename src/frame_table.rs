// Owns the four pieces of addressable memory an IPPcode23 program can
// touch: the global frame, the (optional) temporary frame, the stack
// of local frames, and the two LIFO stacks (data, call). Frames move
// between slots by ownership transfer (Vec::push/pop of an owned
// Frame), never by cloning, matching the "no shared mutable aliasing"
// invariant in the data model.

use crate::error::Error;
use crate::frame::Frame;
use crate::value::Value;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameTag {
    Gf,
    Lf,
    Tf,
}

impl FrameTag {
    pub fn parse(s: &str) -> Option<FrameTag> {
        match s {
            "GF" => Some(FrameTag::Gf),
            "LF" => Some(FrameTag::Lf),
            "TF" => Some(FrameTag::Tf),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            FrameTag::Gf => "GF",
            FrameTag::Lf => "LF",
            FrameTag::Tf => "TF",
        }
    }
}

pub struct FrameTable {
    gf: Frame,
    tf: Option<Frame>,
    lfs: Vec<Frame>,
    pub data_stack: Vec<Value>,
    pub call_stack: Vec<usize>,
}

impl FrameTable {
    pub fn new() -> FrameTable {
        FrameTable {
            gf: Frame::new(),
            tf: None,
            lfs: Vec::new(),
            data_stack: Vec::new(),
            call_stack: Vec::new(),
        }
    }

    fn missing(tag: FrameTag) -> Error {
        Error::MissingFrame(tag.label().to_string())
    }

    pub fn frame(&self, tag: FrameTag) -> Result<&Frame, Error> {
        match tag {
            FrameTag::Gf => Ok(&self.gf),
            FrameTag::Tf => self.tf.as_ref().ok_or_else(|| Self::missing(tag)),
            FrameTag::Lf => self.lfs.last().ok_or_else(|| Self::missing(tag)),
        }
    }

    pub fn frame_mut(&mut self, tag: FrameTag) -> Result<&mut Frame, Error> {
        match tag {
            FrameTag::Gf => Ok(&mut self.gf),
            FrameTag::Tf => self.tf.as_mut().ok_or_else(|| Self::missing(tag)),
            FrameTag::Lf => self.lfs.last_mut().ok_or_else(|| Self::missing(tag)),
        }
    }

    pub fn create_frame(&mut self) {
        self.tf = Some(Frame::new());
    }

    pub fn push_frame(&mut self) -> Result<(), Error> {
        let tf = self.tf.take().ok_or_else(|| Self::missing(FrameTag::Tf))?;
        self.lfs.push(tf);
        Ok(())
    }

    pub fn pop_frame(&mut self) -> Result<(), Error> {
        let lf = self.lfs.pop().ok_or_else(|| Self::missing(FrameTag::Lf))?;
        self.tf = Some(lf);
        Ok(())
    }

    /// Count of every currently-reachable variable across GF, TF (if
    /// present), and every local frame on LFS — used by the stats
    /// collector's peak-live-variable counter.
    pub fn live_var_count(&self) -> usize {
        let mut count = self.gf.len();
        if let Some(tf) = &self.tf {
            count += tf.len();
        }
        for lf in &self.lfs {
            count += lf.len();
        }
        count
    }

    pub fn tf(&self) -> Option<&Frame> {
        self.tf.as_ref()
    }

    pub fn top_lf(&self) -> Option<&Frame> {
        self.lfs.last()
    }

    pub fn gf(&self) -> &Frame {
        &self.gf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pushframe_requires_tf() {
        let mut ft = FrameTable::new();
        assert!(ft.push_frame().is_err());
        ft.create_frame();
        assert!(ft.push_frame().is_ok());
        assert!(ft.tf().is_none());
    }

    #[test]
    fn popframe_round_trip_restores_tf() {
        let mut ft = FrameTable::new();
        ft.create_frame();
        ft.frame_mut(FrameTag::Tf).unwrap().define("x").unwrap();
        ft.push_frame().unwrap();
        assert!(ft.frame(FrameTag::Lf).is_ok());
        ft.pop_frame().unwrap();
        assert!(ft.tf().unwrap().get("x").is_ok());
        assert!(ft.frame(FrameTag::Lf).is_err());
    }

    #[test]
    fn createframe_discards_existing_tf() {
        let mut ft = FrameTable::new();
        ft.create_frame();
        ft.frame_mut(FrameTag::Tf).unwrap().define("x").unwrap();
        ft.create_frame();
        assert!(ft.frame(FrameTag::Tf).unwrap().get("x").is_err());
    }

    #[test]
    fn live_var_count_sums_all_reachable_frames() {
        let mut ft = FrameTable::new();
        ft.frame_mut(FrameTag::Gf).unwrap().define("a").unwrap();
        ft.create_frame();
        ft.frame_mut(FrameTag::Tf).unwrap().define("b").unwrap();
        ft.push_frame().unwrap();
        ft.frame_mut(FrameTag::Lf).unwrap().define("c").unwrap();
        assert_eq!(ft.live_var_count(), 2);
        ft.create_frame();
        ft.frame_mut(FrameTag::Tf).unwrap().define("d").unwrap();
        assert_eq!(ft.live_var_count(), 3);
    }
}
