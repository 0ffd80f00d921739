//! Join tree - association paths joined from the queried entity

use super::types::JoinMode;

/// A node of the join tree
///
/// The node handed to a query filter stands for the queried entity itself;
/// its children are association fields joined from it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Root {
    path: String,
    alias: Option<String>,
    mode: JoinMode,
    fetch: bool,
    children: Vec<Root>,
}

impl Root {
    /// The root node of a query
    pub fn new() -> Self {
        Self::default()
    }

    fn child(path: &str, mode: JoinMode) -> Self {
        Self {
            path: path.to_string(),
            mode,
            ..Self::default()
        }
    }

    /// Inner join an association; dotted paths join nested associations
    pub fn join(&mut self, path: &str) -> &mut Root {
        self.join_with(path, JoinMode::Inner)
    }

    /// Left join an association
    pub fn left_join(&mut self, path: &str) -> &mut Root {
        self.join_with(path, JoinMode::Left)
    }

    /// Full outer join an association
    pub fn full_join(&mut self, path: &str) -> &mut Root {
        self.join_with(path, JoinMode::Full)
    }

    /// Join an association, returning the existing node when already joined
    pub fn join_with(&mut self, path: &str, mode: JoinMode) -> &mut Root {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        let index = match self.children.iter().position(|c| c.path == head) {
            Some(index) => index,
            None => {
                self.children.push(Root::child(head, mode));
                self.children.len() - 1
            }
        };
        let node = &mut self.children[index];
        match rest {
            Some(rest) => node.join_with(rest, mode),
            None => node,
        }
    }

    /// Name this node's table in the query
    pub fn alias(&mut self, alias: &str) -> &mut Self {
        self.alias = Some(alias.to_string());
        self
    }

    /// Append this node's columns to the SELECT list
    pub fn fetch(&mut self) -> &mut Self {
        self.fetch = true;
        self
    }

    /// Association field name; empty for the query root
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn alias_name(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn mode(&self) -> JoinMode {
        self.mode
    }

    pub fn is_fetch(&self) -> bool {
        self.fetch
    }

    pub fn children(&self) -> &[Root] {
        &self.children
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_reuses_existing_path() {
        let mut root = Root::new();
        root.join("group").alias("g");
        root.left_join("group").fetch();

        assert_eq!(root.children().len(), 1);
        let group = &root.children()[0];
        assert_eq!(group.alias_name(), Some("g"));
        assert_eq!(group.mode(), JoinMode::Inner);
        assert!(group.is_fetch());
    }

    #[test]
    fn test_dotted_paths_nest() {
        let mut root = Root::new();
        root.left_join("group.owner").alias("o");

        let group = &root.children()[0];
        assert_eq!(group.path(), "group");
        assert_eq!(group.mode(), JoinMode::Left);
        assert_eq!(group.children()[0].path(), "owner");
        assert_eq!(group.children()[0].alias_name(), Some("o"));
    }
}
