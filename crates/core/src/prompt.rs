//! The assembled prompt sent to the completion model.
//!
//! Segment order is fixed by construction: instructions, optional
//! retrieved context, history oldest→newest, then exactly one user
//! question. There is no API to insert or reorder segments afterwards.

use serde::{Deserialize, Serialize};

use crate::message::{ConversationTurn, Role};

/// Which part of the prompt a segment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Instruction,
    Context,
    History,
    Question,
}

/// A single `{role, text}` entry of the prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptSegment {
    pub role: Role,
    pub text: String,
    pub kind: SegmentKind,
}

/// An ordered prompt, ready for a completion backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledPrompt {
    segments: Vec<PromptSegment>,
}

impl AssembledPrompt {
    /// Build a prompt in the canonical order.
    ///
    /// `context` of `None` (or blank) produces no context segment at all.
    /// `history` must already be ordered oldest→newest.
    pub fn new(
        instructions: &[String],
        context: Option<&str>,
        history: &[ConversationTurn],
        question: impl Into<String>,
    ) -> Self {
        let mut segments = Vec::with_capacity(instructions.len() + history.len() + 2);

        segments.extend(instructions.iter().map(|text| PromptSegment {
            role: Role::System,
            text: text.clone(),
            kind: SegmentKind::Instruction,
        }));

        if let Some(ctx) = context.filter(|c| !c.trim().is_empty()) {
            segments.push(PromptSegment {
                role: Role::System,
                text: format!("Context from documents:\n{ctx}"),
                kind: SegmentKind::Context,
            });
        }

        segments.extend(history.iter().map(|turn| PromptSegment {
            role: turn.role.into(),
            text: turn.content.clone(),
            kind: SegmentKind::History,
        }));

        segments.push(PromptSegment {
            role: Role::User,
            text: question.into(),
            kind: SegmentKind::Question,
        });

        Self { segments }
    }

    pub fn segments(&self) -> &[PromptSegment] {
        &self.segments
    }

    pub fn has_context(&self) -> bool {
        self.segments.iter().any(|s| s.kind == SegmentKind::Context)
    }

    pub fn history_len(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| s.kind == SegmentKind::History)
            .count()
    }

    /// The final user question.
    pub fn question(&self) -> &str {
        self.segments
            .last()
            .map(|s| s.text.as_str())
            .unwrap_or_default()
    }

    /// Rough size estimate (4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        self.segments.iter().map(|s| s.text.len() / 4).sum()
    }
}
