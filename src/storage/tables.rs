use redb::TableDefinition;

/// Users: user_id -> User (msgpack)
pub const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

/// Secondary index: lowercase email -> user_id
pub const USER_EMAILS: TableDefinition<&str, &str> = TableDefinition::new("user_emails");

/// Courses: course_id -> Course (msgpack)
pub const COURSES: TableDefinition<&str, &[u8]> = TableDefinition::new("courses");
