//! Prompt rendering for reply generation.
//!
//! [`assemble`] is a pure function: identical inputs always produce a
//! byte-identical prompt. The incoming email is inserted verbatim between
//! double quotes; callers strip anything that should not reach the model.

/// Render the reply prompt for `company_name` around `incoming_text`.
///
/// When `examples` is empty the examples section is left out entirely, and
/// the tone instruction no longer refers to it.
pub fn assemble(incoming_text: &str, company_name: &str, examples: &[String]) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "You are an email assistant for {company_name}. \
         Write a professional reply that matches the company's communication style.\n\n"
    ));
    prompt.push_str("INCOMING EMAIL:\n");
    prompt.push_str(&format!("\"{incoming_text}\"\n\n"));
    prompt.push_str(&examples_section(examples));

    prompt.push_str("INSTRUCTIONS:\n");
    prompt.push_str("- Write a polite, professional, helpful reply\n");
    if !examples.is_empty() {
        prompt.push_str("- Match the tone and style of the company examples above\n");
        prompt.push_str("- Use similar language patterns, but do not copy the examples verbatim\n");
    }
    prompt.push_str("- Keep it concise (2-3 sentences)\n");
    prompt.push_str("- Be solution-oriented\n\n");
    prompt.push_str("REPLY:");

    prompt
}

/// Numbered example list with its header, or an empty string.
fn examples_section(examples: &[String]) -> String {
    if examples.is_empty() {
        return String::new();
    }
    let list = examples
        .iter()
        .enumerate()
        .map(|(i, example)| format!("{}. {}", i + 1, example))
        .collect::<Vec<_>>()
        .join("\n");
    format!("COMPANY EMAIL EXAMPLES (match this tone and style):\n{list}\n\n")
}
