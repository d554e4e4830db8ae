/// One segment of a property path such as `orders[0].items[sku].price`.
///
/// `name` is the bare property, `index` the bracketed part if any, and `children` the
/// remainder of the path after the first `.`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyTokenizer<'a> {
    name: &'a str,
    indexed_name: &'a str,
    index: Option<&'a str>,
    children: Option<&'a str>,
}

impl<'a> PropertyTokenizer<'a> {
    #[must_use]
    pub fn new(full_name: &'a str) -> Self {
        let (head, children) = match full_name.find('.') {
            Some(delim) => (&full_name[..delim], Some(&full_name[delim + 1..])),
            None => (full_name, None),
        };
        let (name, index) = match head.find('[') {
            Some(delim) if head.ends_with(']') => {
                (&head[..delim], Some(&head[delim + 1..head.len() - 1]))
            }
            _ => (head, None),
        };
        Self {
            name,
            indexed_name: head,
            index,
            children,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'a str {
        self.name
    }

    #[must_use]
    pub fn indexed_name(&self) -> &'a str {
        self.indexed_name
    }

    #[must_use]
    pub fn index(&self) -> Option<&'a str> {
        self.index
    }

    #[must_use]
    pub fn children(&self) -> Option<&'a str> {
        self.children
    }

    /// Tokenizer for the rest of the path, if any.
    #[must_use]
    pub fn next_segment(&self) -> Option<PropertyTokenizer<'a>> {
        self.children.map(PropertyTokenizer::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_nested_and_indexed_paths() {
        let tok = PropertyTokenizer::new("orders[0].items[sku].price");
        assert_eq!(tok.name(), "orders");
        assert_eq!(tok.index(), Some("0"));
        assert_eq!(tok.indexed_name(), "orders[0]");
        assert_eq!(tok.children(), Some("items[sku].price"));

        let next = tok.next_segment().unwrap();
        assert_eq!(next.name(), "items");
        assert_eq!(next.index(), Some("sku"));

        let last = next.next_segment().unwrap();
        assert_eq!(last.name(), "price");
        assert_eq!(last.index(), None);
        assert!(last.next_segment().is_none());
    }
}
