/// Bump whenever `BREW_ANALYSIS_PROMPT` changes; model behaviour changes with it.
pub const PROMPT_VERSION: &str = "brew-analysis/v1";

const BREW_METHOD_PLACEHOLDER: &str = "{brew_method}";

/// Instruction sent alongside every brew photo. `{brew_method}` is substituted verbatim.
pub const BREW_ANALYSIS_PROMPT: &str = r#"You are an expert barista and coffee extraction analyst. Analyze this {brew_method} coffee brew photo.

Evaluate the following aspects:
1. **Color Analysis**: Assess the color uniformity and what it indicates about extraction
2. **Pattern Analysis**: Look for signs of channeling (uneven water flow paths)
3. **Texture Notes**: Analyze the crema (espresso) or coffee bed (pour-over) texture
4. **Extraction Score**: Rate from 0-100 based on visual indicators
5. **Issues**: Identify channeling or over/under extraction and suggest fixes

Respond with ONLY valid JSON in this exact format, with no text before or after it:
{
  "extractionScore": <number 0-100>,
  "visualFeedback": {
    "colorAnalysis": "<string>",
    "patternAnalysis": "<string>",
    "textureNotes": "<string>"
  },
  "channeling": <boolean>,
  "overExtraction": <boolean>,
  "aiSuggestions": "<string: specific actionable recommendations>"
}"#;

pub fn build_instruction(brew_method: &str) -> String {
    BREW_ANALYSIS_PROMPT.replacen(BREW_METHOD_PLACEHOLDER, brew_method, 1)
}
