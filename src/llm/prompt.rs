use crate::ingest::EncodedFile;
use super::provider::GenerationRequest;

pub const DEFAULT_REQUEST: &str = "Generate a standard troubleshooting article.";

pub const GENERATE_SYSTEM_INSTRUCTION: &str = r#"
<system_instructions>
  <role>
    You are an Expert Knowledge Manager and Senior Technical Writer for an Enterprise IT organization.
    Your goal is to transform raw technical inputs (logs, messy notes, screenshots, diagrams, PDFs) into authoritative, strictly structured ServiceNow Knowledge Base (KB) Articles.
  </role>

  <directives>
    1. Analyze Input Nodes: Scan all provided context (text, images, PDF content) to understand the technical scenario.
    2. Identify Root Cause: Determine the underlying issue and the resolution logic.
    3. Map Solution Steps: Structure the solution into clear, linear, reproducible phases.
    4. Generate Structured Output: Produce the final HTML artifact following the strict template.
  </directives>

  <style_guide>
    - Tone: Professional, authoritative, direct (Active Voice).
    - Formatting: ServiceNow HTML standards (Arial font).
    - UI elements in <strong>, keyboard shortcuts and variables in <code>.
    - Visuals: Use styled <div> placeholders for missing images: <div class="screenshot-placeholder">[FIGURE: Description]</div>, placed immediately after the step it depicts.
    - Warnings: Highlight critical risks in red or bold.
  </style_guide>

  <template_specification>
    The output must be a single HTML file containing:
    - Header: KB Number (placeholder KBXXXXXXX if unknown), Version, Title (H1).
    - Introduction: (H2) Purpose, Scope.
    - Triage/Prerequisites: (Alert Box) Conditions to stop/escalate.
    - Resolution: (Repeater) Phase X (H2) -> Step Y (H3) -> Action items (ul/li).
  </template_specification>

  <output_requirements>
    Return ONLY the raw HTML code. Start immediately with <!DOCTYPE html>.
    Include a <style> block in the <head>: Arial font, bold headers, monospace variables, red warnings,
    light gray dashed centered placeholders.
  </output_requirements>
</system_instructions>
"#;

pub const UPDATE_SYSTEM_INSTRUCTION: &str = "You are an expert Technical Editor.
Your goal is to modify existing Knowledge Base Article HTML code based on user instructions.

CORE DIRECTIVES:
1. **Analyze the Request**: Understand what the user wants to change.
2. **Modify the Code**: Return the FULLY UPDATED HTML code. Do not return diffs or partial snippets.
3. **Preserve Format**: Maintain the ServiceNow/KB styling and structure.
4. **No External Images**: Continue to use styled placeholders for images.

RESPONSE FORMAT:
Return ONLY the raw HTML code. Start immediately with <!DOCTYPE html>.";

/// Renders the `<context_data>` block that opens every generation turn.
pub fn context_block(prompt: &str, files: &[EncodedFile], extracted_text: &str) -> String {
    let request = if prompt.trim().is_empty() { DEFAULT_REQUEST } else { prompt };

    let extracted = if extracted_text.is_empty() {
        String::new()
    } else {
        format!("<extracted_text_content>{}</extracted_text_content>", extracted_text)
    };

    let manifest = files.iter()
        .map(|f| format!("<file name=\"{}\" type=\"{}\" />", f.name, f.mime_type))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "<context_data>
    <user_request>{}</user_request>
    {}
    <file_manifest>
      {}
    </file_manifest>
  </context_data>",
        request, extracted, manifest
    )
}

/// Builds the multi-part request for a fresh article: the context block, then
/// one image part per `image/*` input. PDFs only contribute through extracted text.
pub fn generation_request(prompt: &str, files: &[EncodedFile], extracted_text: &str) -> GenerationRequest {
    let mut request = GenerationRequest::new(GENERATE_SYSTEM_INSTRUCTION)
        .text(context_block(prompt, files, extracted_text))
        .temperature(0.2)
        .max_tokens(4000);

    for file in files.iter().filter(|f| f.is_image()) {
        request = request.image(file.mime_type.clone(), file.base64.clone());
    }
    request
}

pub fn refine_request(current_html: &str, instructions: &str) -> GenerationRequest {
    let prompt = format!(
        "
    USER INSTRUCTIONS: {}

    CURRENT KB ARTICLE HTML:
    {}
    ",
        instructions, current_html
    );
    GenerationRequest::new(UPDATE_SYSTEM_INSTRUCTION).text(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::ContentPart;

    fn file(name: &str, mime: &str) -> EncodedFile {
        EncodedFile {
            name: name.into(),
            mime_type: mime.into(),
            base64: "Zm9v".into(),
        }
    }

    #[test]
    fn empty_prompt_uses_default_request() {
        let block = context_block("   ", &[], "");
        assert!(block.contains("<user_request>Generate a standard troubleshooting article.</user_request>"));
        assert!(!block.contains("<extracted_text_content>"));
    }

    #[test]
    fn manifest_lists_every_file() {
        let files = [file("shot.png", "image/png"), file("guide.pdf", "application/pdf")];
        let block = context_block("fix vpn", &files, "[Page 1] hello");
        assert!(block.contains("<extracted_text_content>[Page 1] hello</extracted_text_content>"));
        assert!(block.contains("<file name=\"shot.png\" type=\"image/png\" />\n<file name=\"guide.pdf\""));
    }

    #[test]
    fn only_images_become_image_parts() {
        let files = [file("shot.png", "image/png"), file("guide.pdf", "application/pdf")];
        let request = generation_request("fix vpn", &files, "");

        assert_eq!(request.parts.len(), 2);
        assert!(matches!(&request.parts[1], ContentPart::Image { mime_type, .. } if mime_type == "image/png"));
        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(request.max_tokens, Some(4000));
        assert_eq!(request.system, GENERATE_SYSTEM_INSTRUCTION);
    }

    #[test]
    fn refine_carries_instructions_then_html() {
        let request = refine_request("<h1>Old</h1>", "rename the title");
        let ContentPart::Text(text) = &request.parts[0] else { panic!("expected text part") };
        let instr = text.find("USER INSTRUCTIONS: rename the title").unwrap();
        let html = text.find("CURRENT KB ARTICLE HTML:\n    <h1>Old</h1>").unwrap();
        assert!(instr < html);
        assert_eq!(request.temperature, None);
        assert_eq!(request.max_tokens, None);
    }
}
