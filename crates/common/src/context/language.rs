//! Query language detection
//!
//! The corpus and the users are bilingual. Answers, fallbacks and error
//! messages mirror the language of the question, decided by script.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    English,
    Hebrew,
}

impl Language {
    pub fn name(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Hebrew => "Hebrew",
        }
    }

    /// Shown when retrieval finds nothing relevant
    pub fn no_context_message(&self) -> &'static str {
        match self {
            Language::English => {
                "I couldn't find information about that in the documents available to me. \
                 Could you rephrase the question, or ask about the digital health literacy research?"
            }
            Language::Hebrew => {
                "לא מצאתי מידע על כך במסמכים שברשותי. \
                 אפשר לנסח את השאלה מחדש, או לשאול על המחקר בנושא אוריינות בריאות דיגיטלית?"
            }
        }
    }

    /// Shown when retrieval or generation fails
    pub fn error_message(&self) -> &'static str {
        match self {
            Language::English => "Sorry, I encountered an error. Please try again.",
            Language::Hebrew => "מצטער, אירעה שגיאה. אנא נסו שוב.",
        }
    }
}

fn is_hebrew_letter(c: char) -> bool {
    ('\u{05D0}'..='\u{05EA}').contains(&c) || ('\u{FB1D}'..='\u{FB4F}').contains(&c)
}

/// Hebrew when Hebrew letters are at least as common as Latin letters
pub fn detect_language(text: &str) -> Language {
    let (hebrew, latin) = text.chars().fold((0usize, 0usize), |(h, l), c| {
        if is_hebrew_letter(c) {
            (h + 1, l)
        } else if c.is_ascii_alphabetic() {
            (h, l + 1)
        } else {
            (h, l)
        }
    });

    if hebrew > 0 && hebrew >= latin {
        Language::Hebrew
    } else {
        Language::English
    }
}
