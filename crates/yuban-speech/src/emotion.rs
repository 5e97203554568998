//! Emotion label vocabulary shared by the classifier and the audio selector.

use serde::{Deserialize, Serialize};

/// Closed label set produced by the sentiment model. Two labels
/// ([`Emotion::Angry`], [`Emotion::Disgusted`]) are recognized here but have
/// no reference-clip mapping; see [`crate::selector::AudioPrompt::Unmapped`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Neutral,
    Caring,
    Happy,
    Angry,
    Sad,
    Questioning,
    Surprised,
    Disgusted,
}

/// Keyword lexicon used when the classifier is unavailable. Checked in this
/// order; the first label with a matching keyword wins.
const KEYWORD_TABLE: &[(Emotion, &[&str])] = &[
    (
        Emotion::Happy,
        &["开心", "高兴", "快乐", "兴奋", "愉快", "😊", "😄", "😃"],
    ),
    (
        Emotion::Sad,
        &["悲伤", "难过", "伤心", "痛苦", "失落", "😢", "😭", "😔"],
    ),
    (
        Emotion::Questioning,
        &["什么", "怎么", "为什么", "如何", "?", "？", "吗", "呢"],
    ),
    (
        Emotion::Surprised,
        &["惊讶", "吃惊", "震惊", "意外", "😮", "😲", "哇"],
    ),
    (
        Emotion::Caring,
        &["关心", "担心", "关爱", "照顾", "注意", "小心"],
    ),
];

impl Emotion {
    /// Map the classifier head's output index to a label.
    pub fn from_label_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(Self::Neutral),
            1 => Some(Self::Caring),
            2 => Some(Self::Happy),
            3 => Some(Self::Angry),
            4 => Some(Self::Sad),
            5 => Some(Self::Questioning),
            6 => Some(Self::Surprised),
            7 => Some(Self::Disgusted),
            _ => None,
        }
    }

    /// Chinese display label, matching the classifier's training vocabulary.
    pub const fn label_zh(self) -> &'static str {
        match self {
            Self::Neutral => "平淡",
            Self::Caring => "关切",
            Self::Happy => "开心",
            Self::Angry => "愤怒",
            Self::Sad => "悲伤",
            Self::Questioning => "疑问",
            Self::Surprised => "惊讶",
            Self::Disgusted => "厌恶",
        }
    }

    /// Lexical fallback classification. Pure function of the input text.
    pub fn from_keywords(text: &str) -> Self {
        let lowered = text.to_lowercase();
        for (emotion, keywords) in KEYWORD_TABLE {
            if keywords.iter().any(|keyword| lowered.contains(keyword)) {
                return *emotion;
            }
        }
        Self::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_keyword_wins() {
        assert_eq!(Emotion::from_keywords("我今天很开心"), Emotion::Happy);
    }

    #[test]
    fn question_marks_classify_as_questioning() {
        assert_eq!(Emotion::from_keywords("今天天气好吗"), Emotion::Questioning);
        assert_eq!(Emotion::from_keywords("really?"), Emotion::Questioning);
    }

    #[test]
    fn earlier_table_entries_take_precedence() {
        // Contains both a happy and a questioning keyword; happy is listed
        // first in the table.
        assert_eq!(Emotion::from_keywords("为什么这么开心"), Emotion::Happy);
    }

    #[test]
    fn unmatched_text_defaults_to_neutral() {
        assert_eq!(Emotion::from_keywords("今天天气不错"), Emotion::Neutral);
        assert_eq!(Emotion::from_keywords(""), Emotion::Neutral);
    }

    #[test]
    fn label_ids_cover_the_full_classifier_head() {
        for id in 0..8 {
            assert!(Emotion::from_label_id(id).is_some());
        }
        assert!(Emotion::from_label_id(8).is_none());
    }

    #[test]
    fn chinese_labels_round_out_the_vocabulary() {
        assert_eq!(Emotion::Neutral.label_zh(), "平淡");
        assert_eq!(Emotion::Disgusted.label_zh(), "厌恶");
    }
}
