use redb::ReadableTable;

use super::db::{Database, DatabaseError};
use super::models::Course;
use super::tables::*;

impl Database {
    // ========================================================================
    // Course operations
    // ========================================================================

    /// Insert or replace a course
    pub fn put_course(&self, course: &Course) -> Result<(), DatabaseError> {
        debug_assert!(!course.id.is_empty(), "course id must not be empty");

        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(COURSES)?;
            let data = rmp_serde::to_vec_named(course)?;
            table.insert(course.id.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get a course by id
    pub fn get_course(&self, id: &str) -> Result<Option<Course>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(COURSES)?;

        match table.get(id)? {
            Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
            None => Ok(None),
        }
    }

    /// Apply `update` to a course inside one write transaction. Returns the
    /// updated course, or `None` if there is no such course.
    pub fn update_course<F>(&self, id: &str, update: F) -> Result<Option<Course>, DatabaseError>
    where
        F: FnOnce(&mut Course) -> Result<(), DatabaseError>,
    {
        let write_txn = self.begin_write()?;
        let updated = {
            let mut table = write_txn.open_table(COURSES)?;
            let current: Option<Course> = table
                .get(id)?
                .map(|v| rmp_serde::from_slice(v.value()))
                .transpose()?;

            match current {
                Some(mut course) => {
                    update(&mut course)?;
                    let data = rmp_serde::to_vec_named(&course)?;
                    table.insert(id, data.as_slice())?;
                    Some(course)
                }
                None => None,
            }
        };
        write_txn.commit()?;
        Ok(updated)
    }

    /// Delete a course
    pub fn delete_course(&self, id: &str) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;
        let deleted = {
            let mut table = write_txn.open_table(COURSES)?;
            let removed = table.remove(id)?.is_some();
            removed
        };
        write_txn.commit()?;
        Ok(deleted)
    }

    /// Courses matching `filter`, newest first
    pub fn find_courses<F>(&self, filter: F) -> Result<Vec<Course>, DatabaseError>
    where
        F: Fn(&Course) -> bool,
    {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(COURSES)?;

        let mut courses = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            let course: Course = rmp_serde::from_slice(value.value())?;
            if filter(&course) {
                courses.push(course);
            }
        }

        courses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(courses)
    }
}
