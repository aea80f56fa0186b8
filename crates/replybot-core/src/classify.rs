//! Post classification.
//!
//! Two steps, in fixed precedence:
//!
//! 1. **Links**: every human-authored link is resolved; the first one whose
//!    host is under the publisher domain makes the post [`Category::Cooking`].
//! 2. **Game shares**: the content (and its plain-text view) is run against
//!    one compiled set of game-result patterns. The lowest-numbered branch
//!    that matches decides the category through [`GAME_BRANCHES`].
//!
//! Anything else is [`Category::NoMatch`]. Neither step can fail.

use std::sync::LazyLock;

use regex::RegexSet;

use crate::config::ClassifierConfig;
use crate::models::{Category, ResolvedLink};
use crate::resolve::{LinkResolver, host_matches_domain, host_of};
use crate::traits::{LinkExtractor, LinkProber};

/// One alternative of the game-share pattern.
pub struct GameBranch {
    pub name: &'static str,
    pub category: Category,
    pub pattern: &'static str,
}

/// Game-share branches in declaration order. Order is precedence.
pub const GAME_BRANCHES: &[GameBranch] = &[
    GameBranch {
        name: "wordle",
        category: Category::Wordle,
        pattern: r"Wordle\s[1-9],[0-9]{3}\s[X1-6]/6",
    },
    GameBranch {
        name: "connections",
        category: Category::Connections,
        pattern: r"(?m)Connections\s*\nPuzzle\s#[0-9]+\s*\n(?:[🟨🟩🟦🟪]+[ \t\r]*(?:\n|$))+",
    },
    GameBranch {
        name: "strands",
        category: Category::Strands,
        pattern: r"Strands\s#[0-9]+\s+[^\n]*\s*[🟡🔵]+",
    },
    GameBranch {
        name: "crossword",
        category: Category::Crossword,
        pattern: r"I\ssolved\sthe\s[0-9]{2}/[0-9]{2}/[0-9]{4}\sNew\sYork\sTimes(?:\sMini)?\sCrossword\sin\s",
    },
];

static GAME_SET: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new(GAME_BRANCHES.iter().map(|b| b.pattern)).expect("game patterns must compile")
});

/// Find the first game branch (in declaration order) matching any of `texts`.
pub fn match_game(texts: &[&str]) -> Option<&'static GameBranch> {
    texts
        .iter()
        .flat_map(|text| GAME_SET.matches(text).into_iter())
        .min()
        .map(|index| &GAME_BRANCHES[index])
}

/// Result of classifying one post, with the links that were examined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: Category,
    /// Links resolved during step 1, in extraction order. Stops at the
    /// first publisher match.
    pub resolved: Vec<ResolvedLink>,
    /// Name of the game branch that matched, if step 2 decided.
    pub branch: Option<&'static str>,
}

/// Classifies post content into a [`Category`].
#[derive(Clone)]
pub struct Classifier<X: LinkExtractor, P: LinkProber> {
    extractor: X,
    resolver: LinkResolver<P>,
    publisher_domain: String,
}

impl<X: LinkExtractor, P: LinkProber> Classifier<X, P> {
    pub fn new(extractor: X, prober: P) -> Self {
        Self::with_config(extractor, prober, ClassifierConfig::default())
    }

    pub fn with_config(extractor: X, prober: P, config: ClassifierConfig) -> Self {
        Self {
            extractor,
            resolver: LinkResolver::with_config(prober, config.resolver),
            publisher_domain: config.publisher_domain.to_lowercase(),
        }
    }

    pub fn resolver(&self) -> &LinkResolver<P> {
        &self.resolver
    }

    pub async fn classify(&self, content: &str) -> Category {
        self.classify_detailed(content).await.category
    }

    pub async fn classify_detailed(&self, content: &str) -> Classification {
        let mut resolved = Vec::new();

        if content.trim().is_empty() {
            return Classification {
                category: Category::NoMatch,
                resolved,
                branch: None,
            };
        }

        for link in self.extractor.extract_links(content) {
            let link = self.resolver.resolve_link(&link).await;
            let is_publisher = host_of(&link.final_url)
                .is_some_and(|host| host_matches_domain(&host, &self.publisher_domain));
            resolved.push(link);

            if is_publisher {
                return Classification {
                    category: Category::Cooking,
                    resolved,
                    branch: None,
                };
            }
        }

        let text = self.extractor.plain_text(content);
        match match_game(&[content, text.as_str()]) {
            Some(branch) => Classification {
                category: branch.category,
                resolved,
                branch: Some(branch.name),
            },
            None => Classification {
                category: Category::NoMatch,
                resolved,
                branch: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolverConfig;
    use crate::error::AppError;
    use crate::testutil::{MockExtractor, MockProber};

    fn classifier(extractor: MockExtractor, prober: MockProber) -> Classifier<MockExtractor, MockProber> {
        Classifier::new(extractor, prober)
    }

    #[test]
    fn every_branch_compiles_and_is_named_once() {
        assert_eq!(GAME_SET.len(), GAME_BRANCHES.len());
        let mut names: Vec<_> = GAME_BRANCHES.iter().map(|b| b.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), GAME_BRANCHES.len());
    }

    #[test]
    fn wordle_shapes() {
        assert_eq!(
            match_game(&["Wordle 1,236 4/6"]).map(|b| b.category),
            Some(Category::Wordle)
        );
        assert_eq!(
            match_game(&["Wordle 1,236 X/6\n⬜🟨⬜⬜⬜"]).map(|b| b.category),
            Some(Category::Wordle)
        );
        assert!(match_game(&["Wordle 1236 4/6"]).is_none());
        assert!(match_game(&["Wordle 1,236 7/6"]).is_none());
    }

    #[test]
    fn connections_requires_colored_grid() {
        let share = "Connections\nPuzzle #512\n🟨🟨🟨🟨\n🟩🟩🟩🟩\n🟦🟦🟦🟦\n🟪🟪🟪🟪\n";
        assert_eq!(
            match_game(&[share]).map(|b| b.category),
            Some(Category::Connections)
        );
        assert!(match_game(&["Connections\nPuzzle #512\n⬛⬛⬛⬛\n"]).is_none());
    }

    #[test]
    fn connections_rows_must_be_only_colored_squares() {
        assert!(match_game(&["Connections\nPuzzle #512\n🟨⬛⬛⬛ lol no\n"]).is_none());
        assert!(match_game(&["Connections\nPuzzle #512\n🟨🟨🟨🟨 nice"]).is_none());
        assert_eq!(
            match_game(&["Connections\nPuzzle #512\n🟪🟪🟪🟪"]).map(|b| b.category),
            Some(Category::Connections)
        );
    }

    #[test]
    fn strands_share() {
        let share = "Strands #248\n“Strumming right along”\n🟡🔵🔵🔵\n🔵🔵🔵";
        assert_eq!(
            match_game(&[share]).map(|b| b.category),
            Some(Category::Strands)
        );
    }

    #[test]
    fn single_line_strands_share() {
        let share = "#Strands #248 “Strumming right along ...”🟡🔵🔵🔵🔵🔵🔵🔵";
        assert_eq!(
            match_game(&[share]).map(|b| b.category),
            Some(Category::Strands)
        );
        assert!(match_game(&["Strands #248 no glyphs here"]).is_none());
    }

    #[test]
    fn crossword_share() {
        assert_eq!(
            match_game(&["I solved the 10/05/2024 New York Times Mini Crossword in 0:42!"])
                .map(|b| b.category),
            Some(Category::Crossword)
        );
        assert_eq!(
            match_game(&["I solved the 10/05/2024 New York Times Crossword in 21:07"])
                .map(|b| b.category),
            Some(Category::Crossword)
        );
    }

    #[test]
    fn declaration_order_wins_over_position() {
        // Crossword appears first in the text, but wordle is declared first.
        let text = "I solved the 10/05/2024 New York Times Crossword in 5:00 and Wordle 1,236 3/6";
        let branch = match_game(&[text]).unwrap();
        assert_eq!(branch.name, "wordle");
        assert_eq!(branch.category, Category::Wordle);
    }

    #[test]
    fn label_text_alone_does_not_match() {
        assert!(match_game(&["I love wordle and strands and connections"]).is_none());
    }

    #[tokio::test]
    async fn wordle_in_surrounding_text() {
        let c = classifier(MockExtractor::plain(), MockProber::new());
        let content = "<p>morning all! Wordle 1,236 4/6</p><p>⬜🟧⬜⬜⬜<br />🟧🟧🟧🟧🟧</p>";
        assert_eq!(c.classify(content).await, Category::Wordle);
    }

    #[tokio::test]
    async fn publisher_link_is_cooking() {
        let extractor =
            MockExtractor::with_links(vec!["https://cooking.nytimes.com/recipes/1025-soup".into()]);
        let prober = MockProber::new();
        let c = classifier(extractor, prober.clone());

        let result = c.classify_detailed("<a href=\"...\">soup</a>").await;
        assert_eq!(result.category, Category::Cooking);
        assert_eq!(result.resolved.len(), 1);
        assert_eq!(prober.call_count(), 0);
    }

    #[tokio::test]
    async fn shortened_publisher_link_is_cooking() {
        let extractor = MockExtractor::with_links(vec!["https://nyti.ms/abc".into()]);
        let prober =
            MockProber::new().with_redirect("https://nyti.ms/abc", "https://cooking.nytimes.com/recipe");
        let c = classifier(extractor, prober);

        assert_eq!(c.classify("<a href=\"x\">recipe</a>").await, Category::Cooking);
    }

    #[tokio::test]
    async fn link_test_precedes_game_test() {
        let extractor = MockExtractor::with_links(vec!["https://cooking.nytimes.com/r".into()]);
        let c = classifier(extractor, MockProber::new());

        assert_eq!(c.classify("Wordle 1,236 4/6").await, Category::Cooking);
    }

    #[tokio::test]
    async fn link_test_stops_at_first_match() {
        let extractor = MockExtractor::with_links(vec![
            "https://example.com/a".into(),
            "https://cooking.nytimes.com/r".into(),
            "https://bit.ly/never".into(),
        ]);
        let prober = MockProber::new();
        let c = classifier(extractor, prober.clone());

        let result = c.classify_detailed("links").await;
        assert_eq!(result.category, Category::Cooking);
        assert_eq!(result.resolved.len(), 2);
        assert_eq!(prober.call_count(), 0);
    }

    #[tokio::test]
    async fn other_nytimes_sections_are_not_cooking() {
        let extractor = MockExtractor::with_links(vec!["https://www.nytimes.com/2024/story".into()]);
        let c = classifier(extractor, MockProber::new());

        assert_eq!(c.classify("news").await, Category::NoMatch);
    }

    #[tokio::test]
    async fn unresolvable_link_falls_through_to_patterns() {
        let extractor = MockExtractor::with_links(vec!["https://bit.ly/dead".into()]);
        let prober = MockProber::new().with_error("https://bit.ly/dead", AppError::Timeout(10));
        let c = classifier(extractor, prober);

        let result = c.classify_detailed("Wordle 1,200 2/6").await;
        assert_eq!(result.category, Category::Wordle);
        assert_eq!(result.branch, Some("wordle"));
        assert!(!result.resolved[0].is_resolved());
    }

    #[tokio::test]
    async fn no_match_for_unrelated_content() {
        let c = classifier(MockExtractor::plain(), MockProber::new());
        assert_eq!(c.classify("just had a great sandwich").await, Category::NoMatch);
        assert_eq!(c.classify("").await, Category::NoMatch);
    }

    #[tokio::test]
    async fn custom_publisher_domain() {
        let extractor = MockExtractor::with_links(vec!["https://cooking.example.org/r/1".into()]);
        let config = ClassifierConfig::default()
            .with_publisher_domain("Cooking.Example.org")
            .with_resolver(ResolverConfig::default());
        let c = Classifier::with_config(extractor, MockProber::new(), config);

        assert_eq!(c.classify("recipe").await, Category::Cooking);
    }
}
