//! コールスタックの参照

use crate::errors::DebugError;
use crate::frame::CallFrame;
use crate::host::SourceProvider;

/// 停止時点のコールスタックとフォーカス位置
///
/// フレームは最外フレームから順に並ぶので、インデックスは depth に等しい。
/// スナップショットは停止のたびに作り直し、既存のものを書き換えることはない。
#[derive(Debug, Default)]
pub struct StackNavigator {
    frames: Vec<CallFrame>,
    focus: usize,
}

/// `list` で表示するソース窓
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceWindow {
    pub file: String,
    pub current_line: usize,
    pub lines: Vec<(usize, String)>,
}

impl StackNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新しい停止時点のスタックを取り込み、フォーカスを最新フレームに戻す
    pub fn capture(&mut self, frames: Vec<CallFrame>) -> Result<(), DebugError> {
        if frames.is_empty() {
            return Err(DebugError::InternalInvariant(
                "stack captured at a stop is empty".into(),
            ));
        }
        if let Some((index, frame)) = frames.iter().enumerate().find(|(i, f)| f.depth != *i) {
            return Err(DebugError::InternalInvariant(format!(
                "frame #{} reports depth {}",
                index, frame.depth
            )));
        }

        tracing::debug!(depth = frames.len(), "stack captured");
        self.focus = frames.len() - 1;
        self.frames = frames;
        Ok(())
    }

    /// スナップショットを破棄する（実行再開時）
    pub fn release(&mut self) {
        self.frames.clear();
        self.focus = 0;
    }

    pub fn is_captured(&self) -> bool {
        !self.frames.is_empty()
    }

    /// 最外フレームから順のフレーム列
    pub fn frames(&self) -> &[CallFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// フォーカスインデックス
    pub fn focus_index(&self) -> usize {
        self.focus
    }

    /// フォーカス中のフレーム
    pub fn focus(&self) -> Result<&CallFrame, DebugError> {
        if self.frames.is_empty() {
            return Err(DebugError::NoFrame);
        }
        self.frames.get(self.focus).ok_or_else(|| {
            DebugError::InternalInvariant(format!(
                "focus #{} outside stack of {} frames",
                self.focus,
                self.frames.len()
            ))
        })
    }

    /// 実行中の（最新の）フレーム
    pub fn topmost(&self) -> Result<&CallFrame, DebugError> {
        self.frames.last().ok_or(DebugError::NoFrame)
    }

    /// フォーカスが実行中のフレームかどうか
    pub fn focus_is_topmost(&self) -> bool {
        !self.frames.is_empty() && self.focus == self.frames.len() - 1
    }

    /// 呼び出し元方向（古いフレーム）へ `n` 移動する
    pub fn up(&mut self, n: usize) -> Result<&CallFrame, DebugError> {
        let target = self.focus.checked_sub(n);
        self.move_to(target, "up")
    }

    /// 呼び出し先方向（新しいフレーム）へ `n` 移動する
    pub fn down(&mut self, n: usize) -> Result<&CallFrame, DebugError> {
        let target = self
            .focus
            .checked_add(n)
            .filter(|&index| index < self.frames.len());
        self.move_to(target, "down")
    }

    fn move_to(
        &mut self,
        target: Option<usize>,
        direction: &'static str,
    ) -> Result<&CallFrame, DebugError> {
        if self.frames.is_empty() {
            return Err(DebugError::NoFrame);
        }
        match target {
            Some(index) => {
                self.focus = index;
                Ok(&self.frames[index])
            }
            None => Err(DebugError::NavigationRange {
                direction,
                depth: self.frames.len(),
                focus: self.focus,
            }),
        }
    }

    /// フォーカスフレームの行を中心にしたソース窓を作る
    pub fn list(
        &self,
        sources: &dyn SourceProvider,
        radius: usize,
    ) -> Result<SourceWindow, DebugError> {
        let frame = self.focus()?;
        Ok(SourceWindow {
            file: frame.file.clone(),
            current_line: frame.line,
            lines: sources.window(&frame.file, frame.line, radius),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Bindings;

    fn stack(n: usize) -> Vec<CallFrame> {
        (0..n)
            .map(|depth| CallFrame {
                depth,
                file: "s.sw".into(),
                line: 10 + depth,
                function_name: format!("f{}", depth),
                locals: Bindings::new(),
                globals: Bindings::new(),
            })
            .collect()
    }

    #[test]
    fn test_capture_focuses_topmost() {
        let mut nav = StackNavigator::new();
        nav.capture(stack(3)).unwrap();
        assert_eq!(nav.focus_index(), 2);
        assert!(nav.focus_is_topmost());
        assert_eq!(nav.focus().unwrap().function_name, "f2");
    }

    #[test]
    fn test_up_down_bounds() {
        let mut nav = StackNavigator::new();
        nav.capture(stack(3)).unwrap();

        assert_eq!(nav.up(2).unwrap().function_name, "f0");
        let err = nav.up(1).unwrap_err();
        assert!(matches!(err, DebugError::NavigationRange { direction: "up", .. }));
        // 範囲外の移動ではフォーカスは変わらない
        assert_eq!(nav.focus_index(), 0);

        assert_eq!(nav.down(1).unwrap().function_name, "f1");
        assert!(nav.down(5).is_err());
        assert_eq!(nav.focus_index(), 1);
        assert!(!nav.focus_is_topmost());
    }

    #[test]
    fn test_recapture_resets_focus() {
        let mut nav = StackNavigator::new();
        nav.capture(stack(3)).unwrap();
        nav.up(1).unwrap();
        nav.capture(stack(2)).unwrap();
        assert_eq!(nav.focus_index(), 1);
    }

    #[test]
    fn test_invalid_captures() {
        let mut nav = StackNavigator::new();
        assert!(nav.capture(Vec::new()).unwrap_err().is_fatal());

        let mut frames = stack(2);
        frames[1].depth = 5;
        assert!(nav.capture(frames).unwrap_err().is_fatal());
    }

    #[test]
    fn test_released_stack_has_no_frame() {
        let mut nav = StackNavigator::new();
        nav.capture(stack(1)).unwrap();
        nav.release();
        assert!(matches!(nav.focus(), Err(DebugError::NoFrame)));
        assert!(matches!(nav.up(1), Err(DebugError::NoFrame)));
    }
}
