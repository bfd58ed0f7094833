use crate::api::{ChatTurn, NarrativePreferences, TurnRole};

/// Instruction for a fresh chapter built from user-supplied context.
pub fn chapter_prompt(
    context: &str,
    narrative: &NarrativePreferences,
    chapter_number: u32,
) -> String {
    let chapter_label = if chapter_number == 1 {
        "first chapter".to_string()
    } else {
        format!("chapter #{chapter_number}")
    };

    let mut prompt = format!(
        "You are an AI-powered novel-writing assistant. \
         The user will provide a background context, including setting, characters, plot, and tone. \
         Your task is to generate a well-written, immersive chapter that aligns with the given details. \
         Do not analyze or plan in your response; immediately generate the chapter in a fluid, engaging manner. \
         Ensure logical flow, strong character development, and vivid descriptions. \
         Use appropriate pacing, dialogue, and narrative techniques suited to the genre. \
         The output should be a fully formatted chapter, not an explanation of how you are writing it. \
         The emphasis should be on dialogues. Generate more dialogues between the characters and make it natural. \
         Make the characters as verbal as you can.\n\
         This chapter is part of a novel and is the {chapter_label}.\n"
    );
    if let Some(genre) = narrative.genre.as_deref() {
        prompt.push_str(&format!(
            "The chapter should be in the following genre: {genre}.\n"
        ));
    }
    if let Some(style) = narrative.writing_style.as_deref() {
        prompt.push_str(&format!(
            "The chapter should be written in the following style: {style}.\n"
        ));
    }
    if let Some(pov) = narrative.point_of_view.as_deref() {
        prompt.push_str(&format!(
            "The chapter should be written in the following point of view: {pov}.\n"
        ));
    }
    prompt.push_str(&format!("Here's the context given by the user: {context}"));
    prompt
}

/// Instruction built from a client-held chat transcript.
pub fn story_prompt(history: &[ChatTurn], latest_input: &str) -> String {
    let transcript = history
        .iter()
        .map(|turn| {
            let speaker = match turn.role {
                TurnRole::User => "User",
                TurnRole::Assistant => "Assistant",
            };
            format!("{speaker}: {}", turn.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Below is a conversation history where the user and the AI have been collaborating on a novel. \
         The AI has generated chapter content based on user prompts, and the user has provided feedback or additional instructions. \
         Use the conversation history to understand the context, style, and tone of the novel so far. \
         Continue the novel while maintaining consistency in plot, character development, and writing style. \
         If the user has provided specific instructions, incorporate them seamlessly. \
         The emphasis should be on dialogues. Generate more dialogues between the characters and make it natural. \
         Make the characters as verbal as you can. \
         If no explicit instructions are given, continue the novel naturally while ensuring a smooth transition from the last response.\n\n\
         **Conversation History:**\n{transcript}\n\n\
         **Latest User Input:**\n{latest_input}\n\n\
         **Continue the novel:**"
    )
}

/// Instruction for the next chapter of an already running story. The whole
/// story plus the previous chapter travel inside the prompt so the model
/// keeps tone and plot without any provider-side memory.
pub fn continuation_prompt(
    chapter_number: u32,
    story_so_far: &str,
    previous_chapter: &str,
    instruction: Option<&str>,
) -> String {
    let mut prompt = format!(
        "You are an AI-powered novel-writing assistant. \
         The user had provided a background context, including setting, characters, plot, and tone. \
         A well-written, immersive chapter was generated which had aligned with the given details by user. \
         You need to continue the chapter or novel further now with same logical flow while maintaining character development. \
         The pacing of chapter or novel is not to be altered too much but progressed gradually. \
         Do not analyze or plan in your response; immediately generate the content of this or next chapter in a fluid, engaging manner. \
         The output should be a fully formatted chapter, not an explanation of how you are writing it. \
         The emphasis should be on dialogues. Generate more dialogues between the characters and make it natural. \
         Make the characters as verbal as you can.\n\
         This chapter is part of a novel and is the chapter #{chapter_number}.\n\
         Story so far is {story_so_far}\n\
         Chapter produced earlier is {previous_chapter}"
    );
    if let Some(instruction) = instruction {
        prompt.push_str(&format!(
            "\nLatest instruction from the user: {instruction}"
        ));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn narrative() -> NarrativePreferences {
        NarrativePreferences {
            genre: Some("Fantasy".to_string()),
            writing_style: Some("Descriptive".to_string()),
            point_of_view: Some("Third-Person Limited".to_string()),
        }
    }

    #[test]
    fn chapter_prompt_embeds_context_verbatim() {
        let context = "A cartographer maps a city that rearranges itself at night.";
        let prompt = chapter_prompt(context, &narrative(), 1);
        assert!(prompt.contains(context));
        assert!(prompt.contains("is the first chapter."));
        assert!(prompt.contains("genre: Fantasy."));
        assert!(prompt.contains("style: Descriptive."));
        assert!(prompt.contains("point of view: Third-Person Limited."));
    }

    #[test]
    fn chapter_prompt_skips_absent_narrative_lines() {
        let prompt = chapter_prompt("ctx", &NarrativePreferences::default(), 4);
        assert!(prompt.contains("is the chapter #4."));
        assert!(!prompt.contains("following genre"));
        assert!(!prompt.contains("following style"));
        assert!(!prompt.contains("following point of view"));
    }

    #[test]
    fn story_prompt_formats_the_transcript() {
        let history = vec![
            ChatTurn {
                role: TurnRole::User,
                content: "Begin with a storm.".to_string(),
            },
            ChatTurn {
                role: TurnRole::Assistant,
                content: "The storm broke at dusk.".to_string(),
            },
        ];
        let prompt = story_prompt(&history, "Introduce the smuggler.");
        assert!(prompt.contains("User: Begin with a storm.\n\nAssistant: The storm broke at dusk."));
        assert!(prompt.contains("**Latest User Input:**\nIntroduce the smuggler."));
        assert!(prompt.ends_with("**Continue the novel:**"));
    }

    #[test]
    fn continuation_prompt_carries_story_and_previous_chapter() {
        let story = "Chapter one text. Chapter two text.";
        let previous = "Chapter two text.";
        let prompt = continuation_prompt(3, story, previous, None);
        assert!(prompt.contains("is the chapter #3."));
        assert!(prompt.contains(&format!("Story so far is {story}")));
        assert!(prompt.contains(&format!("Chapter produced earlier is {previous}")));
        assert!(!prompt.contains("Latest instruction"));
    }

    #[test]
    fn continuation_prompt_appends_the_user_instruction() {
        let prompt = continuation_prompt(2, "story", "previous", Some("kill the mentor"));
        assert!(prompt.ends_with("Latest instruction from the user: kill the mentor"));
    }
}
