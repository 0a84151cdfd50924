// Read-only projections of collections owned by the chat service.

diesel::table! {
    chats (id) {
        id -> Text,
        is_group -> Bool,
        users -> Array<Text>,
        old_users -> Array<Text>,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    push_subscriptions (user_id, endpoint) {
        user_id -> Text,
        endpoint -> Text,
        p256dh -> Text,
        auth -> Text,
        created_at -> Timestamptz,
    }
}
