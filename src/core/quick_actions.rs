//! Canned travel prompts offered before the user types anything.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuickAction {
    pub id: &'static str,
    /// REPL command that triggers the action.
    pub command: &'static str,
    pub label: &'static str,
    pub emoji: &'static str,
    pub prompt: &'static str,
}

pub const QUICK_ACTIONS: [QuickAction; 3] = [
    QuickAction {
        id: "booking",
        command: "/hotel",
        label: "Booking the hotel",
        emoji: "🏨",
        prompt: "I need help booking a hotel for my upcoming trip. Can you assist me with finding good options?",
    },
    QuickAction {
        id: "attractions",
        command: "/attractions",
        label: "Popular tourist attractions",
        emoji: "🏛️",
        prompt: "What are the most popular tourist attractions I should visit at my destination?",
    },
    QuickAction {
        id: "car-rental",
        command: "/car",
        label: "Rent a car for my trip",
        emoji: "🚗",
        prompt: "I want to rent a car for my trip. Can you help me understand the options and process?",
    },
];

/// Looks up an action by id or by REPL command.
pub fn find(key: &str) -> Option<&'static QuickAction> {
    QUICK_ACTIONS
        .iter()
        .find(|action| action.id == key || action.command == key)
}
