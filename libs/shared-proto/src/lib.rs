
pub mod pagination {
    use serde::{Deserialize, Serialize};

    pub const DEFAULT_PAGE_SIZE: u32 = 20;
    pub const MAX_PAGE_SIZE: u32 = 100;

    #[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
    pub struct PageQuery {
        pub page: Option<u32>,
        pub page_size: Option<u32>,
    }

    impl PageQuery {
        /// 1-based page number.
        pub fn page(&self) -> u32 {
            self.page.unwrap_or(1).max(1)
        }

        pub fn page_size(&self) -> u32 {
            self.page_size
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE)
        }

        pub fn offset(&self) -> u64 {
            u64::from(self.page() - 1) * u64::from(self.page_size())
        }
    }

    /// List envelope returned by every paginated endpoint.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Paginated<T> {
        pub count: u64,
        pub next: Option<u32>,
        pub previous: Option<u32>,
        pub results: Vec<T>,
    }

    impl<T> Paginated<T> {
        pub fn new(query: &PageQuery, count: u64, results: Vec<T>) -> Self {
            let page = query.page();
            let consumed = query.offset() + results.len() as u64;
            Self {
                count,
                next: (consumed < count).then_some(page + 1),
                previous: (page > 1).then(|| page - 1),
                results,
            }
        }

        /// A page past the end of a non-empty list (or any page > 1 of an
        /// empty list) does not exist.
        pub fn is_out_of_range(&self, query: &PageQuery) -> bool {
            query.page() > 1 && self.results.is_empty()
        }
    }
}

pub mod social {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
    #[serde(rename_all = "snake_case")]
    pub enum ConnectionStatus {
        Pending,
        Accepted,
        Declined,
    }

    impl ConnectionStatus {
        pub fn as_str(self) -> &'static str {
            match self {
                ConnectionStatus::Pending => "pending",
                ConnectionStatus::Accepted => "accepted",
                ConnectionStatus::Declined => "declined",
            }
        }

        pub fn parse(value: &str) -> Option<Self> {
            match value {
                "pending" => Some(ConnectionStatus::Pending),
                "accepted" => Some(ConnectionStatus::Accepted),
                "declined" => Some(ConnectionStatus::Declined),
                _ => None,
            }
        }

        /// Accepted and declined requests never change again.
        pub fn is_terminal(self) -> bool {
            !matches!(self, ConnectionStatus::Pending)
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MessageBody {
        pub message: String,
    }

    impl MessageBody {
        pub fn new(message: impl Into<String>) -> Self {
            Self {
                message: message.into(),
            }
        }
    }
}
