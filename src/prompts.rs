//! Prompt text sent to the image provider.
//!
//! Kept in one place so the wording can be reviewed and tested without a
//! provider, and so the prompt echoed back to callers is exactly the one sent.

/// Template for the image-generation prompt.
///
/// `{theme}` and `{age_group}` are substituted verbatim by [`build_prompt`].
pub const PROMPT_TEMPLATE: &str = "Black and white line art coloring page for children.\n\
Subject: {theme}\n\
Style: simple, cute, friendly\n\
Age group: {age_group}\n\
Clear bold outlines, no shading, no gray tones\n\
White background, centered composition\n\
Printable coloring book style";

/// Build the deterministic provider prompt for a theme and age group.
pub fn build_prompt(theme: &str, age_group: &str) -> String {
    PROMPT_TEMPLATE
        .replace("{theme}", theme)
        .replace("{age_group}", age_group)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_substitutes_both_fields() {
        let p = build_prompt("animals", "3-4");
        assert!(p.contains("Subject: animals\n"));
        assert!(p.contains("Age group: 3-4\n"));
        assert!(!p.contains('{'));
    }

    #[test]
    fn prompt_is_deterministic() {
        assert_eq!(build_prompt("vehicles", "5-6"), build_prompt("vehicles", "5-6"));
    }

    #[test]
    fn prompt_has_seven_lines() {
        assert_eq!(build_prompt("fantasy", "7-8").lines().count(), 7);
        assert!(PROMPT_TEMPLATE.starts_with("Black and white line art"));
        assert!(PROMPT_TEMPLATE.ends_with("Printable coloring book style"));
    }
}
