//! Persona and schema instructions, consumed verbatim by the orchestrator.
//!
//! This text is owned by the prompt-definition collaborator; the pipeline
//! treats it as an opaque constant tagged with a schema version. Bump
//! `SCHEMA_VERSION` whenever the instruction text or the response contract
//! changes, so stored verdicts stay attributable to the contract that
//! produced them.

pub const SCHEMA_VERSION: &str = "v1";

pub const SYSTEM_INSTRUCTION_V1: &str = r#"### ROLE & OBJECTIVE
You are SlopStopper, a highly cynical, protective, and culturally literate AI guardian for a 7-year-old boy.
Your goal is to audit YouTube consumption. You are NOT a generic "brand safety" bot. You are a parent who is tired of "content farms," "brainrot," and "soft radicalization."

### CORE PHILOSOPHY
1. **Visual Grounding First:** You must list what you *physically see* before you form an opinion. If you don't see a toilet, do not call it "Skibidi."
2. **Shorts are Suspect:** Scrutinize Shorts for "dopamine loops" (rapid editing, screaming).
3. **Weird Art vs. Slop:**
   - *Good Weird:* Coherent narrative, artistic intent (e.g., surreal animation).
   - *Bad Weird:* Incoherent chaos, lazy editing, random screaming.
   - Give credit to structure, even if the topic is strange.
4. **The Pipeline:** Watch for seeds of toxicity: "Sigma Male" rhetoric, body shaming, or digital gambling (Roblox/Pet Sim scarcity pressure).

### INSTRUCTIONS
1. **Populate `visual_grounding` first.** This is your reality check.
2. **Classify Ruthlessly.** Use the schema to judge Narrative Quality and Cognitive Nutrition.
3. **Summarize Cynically.** Describe the *intent* of the creator (e.g., "Manufactured drama to sell merch").

Analyze the video stream now.
"#;

/// Per-record user prompt assembled from stored metadata. Transcript text
/// is included only when the external fetcher already attached it.
pub fn build_prompt(
    title: &str,
    url: &str,
    channel_name: &str,
    transcript: Option<&str>,
) -> String {
    let mut prompt = format!(
        "Title: {}\nURL: {}\nChannel: {}\n",
        title,
        url,
        if channel_name.is_empty() {
            "Unknown"
        } else {
            channel_name
        }
    );

    if let Some(text) = transcript {
        prompt.push_str("\n---\nTRANSCRIPT:\n");
        prompt.push_str(text);
        prompt.push_str("\n---\n");
    }

    prompt.push_str("\nAnalyze the video based on the system instructions.\n");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_without_transcript() {
        let p = build_prompt("Robot Build", "https://youtube.com/watch?v=abc", "STEM Lab", None);
        assert!(p.contains("Title: Robot Build"));
        assert!(p.contains("Channel: STEM Lab"));
        assert!(!p.contains("TRANSCRIPT"));
    }

    #[test]
    fn test_prompt_includes_fetched_transcript() {
        let p = build_prompt("Robot Build", "u", "", Some("hello class"));
        assert!(p.contains("TRANSCRIPT:\nhello class"));
        assert!(p.contains("Channel: Unknown"));
    }
}
