use chrono::{DateTime, Utc};
use serenity::model::id::UserId;
use std::{collections::VecDeque, time::Duration};
use tracing::{debug, info};

use crate::{error::PlayerError, sources::Track};

#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    pub track: Track,
    pub requested_by: UserId,
    pub added_at: DateTime<Utc>,
}

impl QueueItem {
    pub fn new(track: Track, requested_by: UserId) -> Self {
        Self {
            track,
            requested_by,
            added_at: Utc::now(),
        }
    }
}

/// Cola FIFO acotada de una sesión
#[derive(Debug)]
pub struct MusicQueue {
    items: VecDeque<QueueItem>,
    max_size: usize,
}

impl MusicQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    /// Agrega un track al final; con la cola llena no se modifica nada
    pub fn push(&mut self, item: QueueItem) -> Result<usize, PlayerError> {
        if self.items.len() >= self.max_size {
            return Err(PlayerError::QueueFull { max: self.max_size });
        }

        info!("➕ Agregado a la cola: {}", item.track.title());
        self.items.push_back(item);
        Ok(self.items.len())
    }

    /// Obtiene el siguiente track (FIFO - First In, First Out)
    pub fn pop_next(&mut self) -> Option<QueueItem> {
        let next = self.items.pop_front();
        match &next {
            Some(item) => info!("➡️ Siguiente en cola (FIFO): {}", item.track.title()),
            None => debug!("📭 Cola vacía, no hay siguiente track"),
        }
        next
    }

    /// Limpia la cola
    pub fn clear(&mut self) {
        if !self.items.is_empty() {
            info!("🗑️ Cola limpiada ({} canciones)", self.items.len());
        }
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueItem> {
        self.items.iter()
    }

    pub fn total_duration(&self) -> Duration {
        self.items.iter().filter_map(|item| item.track.duration()).sum()
    }
}

/// Una página de la cola para mostrar
#[derive(Debug, Clone, PartialEq)]
pub struct QueuePage<'a> {
    pub items: &'a [QueueItem],
    /// Posición (base 0) del primer elemento de la página dentro de la cola
    pub offset: usize,
    pub current_page: usize,
    pub total_pages: usize,
}

/// Obtiene una página específica (base 1) de una lista de elementos
pub fn page(items: &[QueueItem], page: usize, items_per_page: usize) -> QueuePage<'_> {
    let items_per_page = items_per_page.max(1);
    let total_pages = items.len().div_ceil(items_per_page).max(1);
    let current_page = page.clamp(1, total_pages);
    let start = (current_page - 1) * items_per_page;
    let end = (start + items_per_page).min(items.len());

    QueuePage {
        items: &items[start.min(end)..end],
        offset: start,
        current_page,
        total_pages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SourceKind;
    use pretty_assertions::assert_eq;

    fn item(title: &str) -> QueueItem {
        QueueItem::new(
            Track::new(title, "artist", format!("https://youtu.be/{}", title), SourceKind::YouTube)
                .with_duration_secs(60),
            UserId::new(1),
        )
    }

    fn titles(queue: &MusicQueue) -> Vec<String> {
        queue.iter().map(|i| i.track.title().to_string()).collect()
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = MusicQueue::new(10);
        queue.push(item("a")).unwrap();
        queue.push(item("b")).unwrap();
        queue.push(item("c")).unwrap();

        assert_eq!(queue.pop_next().unwrap().track.title(), "a");
        assert_eq!(queue.pop_next().unwrap().track.title(), "b");
        assert_eq!(queue.pop_next().unwrap().track.title(), "c");
        assert!(queue.pop_next().is_none());
    }

    #[test]
    fn test_full_queue_is_left_unchanged() {
        let mut queue = MusicQueue::new(2);
        assert_eq!(queue.push(item("a")).unwrap(), 1);
        assert_eq!(queue.push(item("b")).unwrap(), 2);

        let err = queue.push(item("c")).unwrap_err();
        assert!(matches!(err, PlayerError::QueueFull { max: 2 }));
        assert_eq!(titles(&queue), vec!["a", "b"]);
    }

    #[test]
    fn test_total_duration() {
        let mut queue = MusicQueue::new(10);
        queue.push(item("a")).unwrap();
        queue.push(item("b")).unwrap();

        assert_eq!(queue.total_duration(), Duration::from_secs(120));
        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pagination() {
        let items: Vec<_> = (0..12).map(|i| item(&i.to_string())).collect();

        let first = page(&items, 1, 5);
        assert_eq!(first.items.len(), 5);
        assert_eq!(first.total_pages, 3);
        assert_eq!(first.offset, 0);

        let last = page(&items, 99, 5);
        assert_eq!(last.current_page, 3);
        assert_eq!(last.items.len(), 2);
        assert_eq!(last.offset, 10);

        let empty = page(&[], 1, 5);
        assert_eq!(empty.total_pages, 1);
        assert!(empty.items.is_empty());
    }
}
