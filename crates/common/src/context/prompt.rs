//! Grounded prompt assembly
//!
//! `assemble_prompt` is a pure function of its inputs: the same system
//! instruction, evidence, history window and query always produce the
//! same prompt.

use super::language::{detect_language, Language};
use crate::models::{ConversationTurn, Role, ScoredChunk};
use std::fmt::Write;

/// Default system instruction: domain framing, grounding and citation rules,
/// language mirroring.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "\
You are Shmulik, an expert assistant for the Samuel Neaman Institute for National Policy Research. \
You are knowledgeable about the institute's digital health literacy research and provide clear, \
authoritative policy insights.

Rules:
1. Answer only from the numbered context passages. If they do not contain the answer, say so plainly.
2. Cite the passages you rely on with their numbers in square brackets, for example [1] or [2][3].
3. Respond in the language of the user's question: English questions get English answers, \
Hebrew questions get Hebrew answers. Never mix languages in one response.
4. The context may be in Hebrew or English. Use all relevant passages regardless of their language, \
translating accurately when needed.
5. Be specific: cite concrete data, statistics and findings when available.
6. Be concise and to the point unless the user asks for more detail.";

/// The two parts sent to the language model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    pub language: Language,
}

/// Build the prompt for one turn.
///
/// Evidence passages are labelled `[n]` (1-based, in retrieval order) with
/// their page span; each history turn is truncated to
/// `history_turn_chars` characters.
pub fn assemble_prompt(
    system_instruction: &str,
    evidence: &[ScoredChunk],
    history: &[ConversationTurn],
    query: &str,
    history_turn_chars: usize,
) -> Prompt {
    let language = detect_language(query);
    let mut user = String::new();

    user.push_str("Context Information:\n");
    for (i, scored) in evidence.iter().enumerate() {
        let chunk = &scored.chunk;
        let _ = write!(
            user,
            "\n[{}] ({}, {})\n{}\n",
            i + 1,
            chunk.pages,
            chunk.source_file,
            chunk.text.trim()
        );
    }

    if !history.is_empty() {
        user.push_str("\nConversation so far:\n");
        for turn in history {
            let speaker = match turn.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            let _ = writeln!(user, "{}: {}", speaker, condense(&turn.text, history_turn_chars));
        }
    }

    let _ = write!(
        user,
        "\nUser Question: {}\n\n\
         RESPONSE LANGUAGE: The question is written in {lang}. Your entire response must be in {lang}.\n\n\
         Answer:",
        query.trim(),
        lang = language.name()
    );

    Prompt {
        system: system_instruction.to_string(),
        user,
        language,
    }
}

/// Collapse whitespace and cut to `max_chars`, marking the cut
fn condense(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}

/// Passage numbers cited in `answer`, in order of first appearance.
///
/// Accepts `[2]` and `[1, 3]` forms; numbers outside `1..=passages` are
/// ignored.
pub fn extract_citations(answer: &str, passages: usize) -> Vec<usize> {
    let mut cited = Vec::new();
    let mut rest = answer;

    while let Some(open) = rest.find('[') {
        let after = &rest[open + 1..];
        let Some(close) = after.find(']') else {
            break;
        };
        let inside = &after[..close];

        let numbers: Option<Vec<usize>> = inside
            .split(',')
            .map(|part| part.trim().parse::<usize>().ok())
            .collect();

        if let Some(numbers) = numbers {
            for n in numbers {
                if (1..=passages).contains(&n) && !cited.contains(&n) {
                    cited.push(n);
                }
            }
        }
        rest = &after[close + 1..];
    }

    cited
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, PageSpan};

    fn scored(id: &str, pages: PageSpan, text: &str) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                id: id.into(),
                document_id: "report".into(),
                source_file: "report.pdf".into(),
                index: 0,
                pages,
                start_offset: 0,
                end_offset: text.chars().count(),
                text: text.into(),
                char_count: text.chars().count(),
                token_estimate: text.len() / 4,
            },
            score: 0.9,
        }
    }

    #[test]
    fn test_prompt_labels_passages_with_pages() {
        let evidence = vec![
            scored("a", PageSpan::single(1), "Digital health literacy improves patient outcomes."),
            scored("b", PageSpan { first: 2, last: 3 }, "Second passage."),
        ];
        let prompt = assemble_prompt("SYSTEM", &evidence, &[], "What improves outcomes?", 100);

        assert_eq!(prompt.system, "SYSTEM");
        assert!(prompt.user.contains("[1] (Page 1, report.pdf)\nDigital health literacy"));
        assert!(prompt.user.contains("[2] (Pages 2-3, report.pdf)"));
        assert!(prompt.user.contains("User Question: What improves outcomes?"));
        assert!(prompt.user.contains("must be in English"));
        assert!(!prompt.user.contains("Conversation so far"));
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let evidence = vec![scored("a", PageSpan::single(1), "text")];
        let history = vec![ConversationTurn::user("hello"), ConversationTurn::assistant("hi")];
        let a = assemble_prompt("S", &evidence, &history, "q", 50);
        let b = assemble_prompt("S", &evidence, &history, "q", 50);
        assert_eq!(a, b);
    }

    #[test]
    fn test_history_is_condensed() {
        let history = vec![ConversationTurn::user("word ".repeat(100))];
        let prompt = assemble_prompt("S", &[], &history, "מה המצב?", 20);
        assert!(prompt.user.contains("User: word word word word…"));
        assert_eq!(prompt.language, Language::Hebrew);
        assert!(prompt.user.contains("must be in Hebrew"));
    }

    #[test]
    fn test_extract_citations_first_appearance_order() {
        let answer = "Outcomes improve [2]. Literacy matters [1][2]. See also [3, 1] and [9].";
        assert_eq!(extract_citations(answer, 3), vec![2, 1, 3]);
    }

    #[test]
    fn test_extract_citations_ignores_non_numeric_brackets() {
        assert_eq!(extract_citations("[note] nothing [0] here [", 4), Vec::<usize>::new());
    }
}
