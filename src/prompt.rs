use serde::Serialize;

use crate::models::GenerationRequest;

pub const SYSTEM_INSTRUCTION: &str = "You are an expert product copywriter specializing in creating compelling, SEO-optimized product descriptions. \
Your writing style is engaging, persuasive, and professional. \
Follow these guidelines:\n\
1. Start with a powerful hook\n\
2. Use sensory and emotional language\n\
3. Highlight unique selling points\n\
4. Include technical details naturally\n\
5. End with a strong call-to-action\n\
6. Break the description into clear paragraphs\n\
7. Use bullet points for key features when appropriate\n\
8. Incorporate keywords naturally and strategically";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// The (system, user) instruction pair sent upstream for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamPrompt {
    pub system: String,
    pub user: String,
}

impl UpstreamPrompt {
    pub fn build(req: &GenerationRequest) -> Self {
        let user = format!(
            "Create a compelling product description with the following details:\n\n\
             Product: {product}\n\
             Target Audience: {audience}\n\
             Key Features: {features}\n\
             Keywords to Include: {keywords}\n\
             Tone: {tone}\n\
             Writing Style: {style}\n\
             Length: {length} (short ≈ 100 words, medium ≈ 200 words, long ≈ 300 words)\n\n\
             Structure the description with:\n\
             1. An attention-grabbing headline\n\
             2. A powerful opening paragraph\n\
             3. Organized feature highlights\n\
             4. Benefits to the user\n\
             5. Technical specifications (if relevant)\n\
             6. A compelling call-to-action\n\n\
             Make it engaging, informative, and persuasive for online shoppers. \
             Use formatting like bullet points, bold text (with ** **), or sections where appropriate.",
            product = req.product_name,
            audience = req.target_audience(),
            features = req.features,
            keywords = req.keywords,
            tone = req.tone(),
            style = req.writing_style(),
            length = req.length(),
        );
        Self { system: SYSTEM_INSTRUCTION.to_string(), user }
    }

    /// Messages in upstream order: system first, then user.
    pub fn messages(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage { role: Role::System, content: self.system.clone() },
            ChatMessage { role: Role::User, content: self.user.clone() },
        ]
    }
}
