use boardroom_common::Member;

/// Name used when the author of a critiqued answer no longer exists.
pub const UNKNOWN_AUTHOR: &str = "another board member";

fn persona(member: &Member) -> String {
    format!(
        "You are a {}. Your background is {}.",
        member.description, member.background
    )
}

/// Prompt asking a member for advice on the user's input.
pub fn advice_prompt(member: &Member, user_input: &str) -> String {
    format!(
        "{} Respond to the following user input: {}",
        persona(member),
        user_input
    )
}

/// Prompt asking a member to weigh in on another member's answer.
pub fn critique_prompt(member: &Member, author: &str, question: &str, answer: &str) -> String {
    format!(
        "{} Another board member, {}, was asked: \"{}\". They answered: \"{}\". \
         Respond with what you think of their answer.",
        persona(member),
        author,
        question,
        answer
    )
}
