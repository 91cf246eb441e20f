/// System prompt for the external renamer
pub const RENAME_SYSTEM_PROMPT: &str = r#"You are a file naming assistant. Your task is to generate a clean, descriptive filename based on a short excerpt of the file's content.

RULES:
1. Output ONLY the filename, on a single line, with no quotes or explanation
2. Use Title_Case words joined by underscores
3. Keep names concise: 2-5 meaningful words
4. Include the document type, the issuing organization and a date (YYYY-MM-DD) when the excerpt shows them
5. Preserve the original file extension
6. If the excerpt is empty or unclear, clean up the original filename instead

EXAMPLES:
- Invoice from Apple dated 14 October 2024 -> Invoice_Apple_2024-10-14.pdf
- Payment receipt, Uber, 2024-12-28 -> Receipt_Uber_2024-12-28.pdf
- Document (1).pdf with no readable content -> Document.pdf"#;

/// Build the user prompt for one file
pub fn build_rename_prompt(original_name: &str, excerpt: &str) -> String {
    let mut prompt = format!("ORIGINAL FILENAME: {}", original_name);

    if !excerpt.trim().is_empty() {
        prompt.push_str(&format!(
            r#"

CONTENT EXCERPT:
---
{}
---"#,
            excerpt
        ));
    }

    prompt.push_str("\n\nRespond with ONLY the new filename including extension.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_omits_empty_excerpt() {
        let prompt = build_rename_prompt("scan.pdf", "   ");
        assert!(prompt.contains("scan.pdf"));
        assert!(!prompt.contains("CONTENT EXCERPT"));

        let prompt = build_rename_prompt("scan.pdf", "Invoice 42");
        assert!(prompt.contains("Invoice 42"));
    }
}
