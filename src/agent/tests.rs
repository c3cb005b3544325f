use super::*;

#[test]
fn granularity_rewrite_applies_to_unqualified_charts() {
    assert_eq!(
        rewrite_granularity("Create a line chart of squats in 2024"),
        "Create a line chart of squats in 2024 per day"
    );
    assert_eq!(
        rewrite_granularity("Can you plot my push ups for March?"),
        "Can you plot my push ups for March? per day"
    );
}

#[test]
fn granularity_rewrite_respects_explicit_granularity() {
    assert_eq!(
        rewrite_granularity("Create a line chart of squats in 2024 per month"),
        "Create a line chart of squats in 2024 per month"
    );
    assert_eq!(
        rewrite_granularity("Show a weekly bar graph of squats"),
        "Show a weekly bar graph of squats"
    );
}

#[test]
fn granularity_rewrite_leaves_plain_questions_alone() {
    assert_eq!(
        rewrite_granularity("How many squats did I do in 2024?"),
        "How many squats did I do in 2024?"
    );
    assert_eq!(rewrite_granularity("What was my best day?"), "What was my best day?");
}

#[test]
fn budget_error_message_names_the_limit() {
    let message = user_visible_message(&PhysioError::ToolBudgetExceeded(6));
    assert!(message.contains("6 tool calls"));

    let message = user_visible_message(&PhysioError::Timeout(60));
    assert!(message.contains("60 seconds"));

    let message =
        user_visible_message(&PhysioError::Execution("no such column: reps".to_string()));
    assert!(message.contains("no such column: reps"));
}

#[test]
fn conversation_is_append_only_and_ordered() {
    let mut conversation = Conversation::new();
    assert!(conversation.is_empty());

    conversation.append(Turn::user("How many squats?"));
    conversation.append(Turn::assistant("You did 120 squats."));
    conversation.append(Turn::user("And push ups?"));

    let turns = conversation.all();
    assert_eq!(turns.len(), 3);
    assert_eq!(turns[0].role, Role::User);
    assert_eq!(turns[0].content, "How many squats?");
    assert_eq!(turns[1].role, Role::Assistant);
    assert_eq!(turns[2].content, "And push ups?");
}

#[test]
fn conversations_have_distinct_sessions() {
    let a = Conversation::new();
    let b = Conversation::new();
    assert_ne!(a.session_id(), b.session_id());
}
