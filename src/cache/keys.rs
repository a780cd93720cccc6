use std::fmt;

/// Kinds of entity served through the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Course,
    User,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Course => "course",
            EntityKind::User => "user",
        }
    }

    /// Every collection listing that can contain an entity of this kind
    pub fn collections(&self) -> &'static [CollectionKey] {
        match self {
            EntityKind::Course => &[CollectionKey::CourseCatalog, CollectionKey::AdminCourses],
            EntityKind::User => &[CollectionKey::AdminUsers],
        }
    }

    /// Cache key of a single entity
    pub fn key(&self, id: &str) -> String {
        format!("{}:{}", self.as_str(), id)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed keys of cached listing queries, one per query shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKey {
    /// Admin listing of all courses with full content
    AdminCourses,
    /// Admin listing of all users
    AdminUsers,
    /// Public catalog of course summaries
    CourseCatalog,
}

impl CollectionKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionKey::AdminCourses => "courses:admin",
            CollectionKey::AdminUsers => "users:admin",
            CollectionKey::CourseCatalog => "courses:catalog",
        }
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
