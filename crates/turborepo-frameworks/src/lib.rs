//! Framework detection: identifies a package's JavaScript framework from its
//! declared dependency names and reports which env var name patterns that
//! framework injects into the build, so a hasher can fold them into a
//! task's env var dependency set without the user having to declare them.

use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    All,
    Some,
}

#[derive(Debug, Clone)]
struct Matcher {
    strategy: Strategy,
    dependencies: &'static [&'static str],
}

impl Matcher {
    fn test(&self, dependency_names: &[String]) -> bool {
        let has = |dep: &&str| dependency_names.iter().any(|d| d == dep);
        match self.strategy {
            Strategy::All => self.dependencies.iter().all(has),
            Strategy::Some => self.dependencies.iter().any(has),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Framework {
    slug: &'static str,
    env_wildcards: &'static [&'static str],
    dependency_match: Matcher,
}

impl Framework {
    pub fn slug(&self) -> &'static str {
        self.slug
    }

    pub fn env_wildcards(&self) -> &'static [&'static str] {
        self.env_wildcards
    }
}

fn framework(
    slug: &'static str,
    strategy: Strategy,
    dependencies: &'static [&'static str],
    env_wildcards: &'static [&'static str],
) -> Framework {
    Framework {
        slug,
        env_wildcards,
        dependency_match: Matcher { strategy, dependencies },
    }
}

static FRAMEWORKS: OnceLock<Vec<Framework>> = OnceLock::new();

/// Order matters: a package matching several entries (e.g. Blitz depends on
/// Next) reports the first, more specific match.
fn frameworks() -> &'static Vec<Framework> {
    FRAMEWORKS.get_or_init(|| {
        vec![
            framework("blitzjs", Strategy::Some, &["blitz"], &["NEXT_PUBLIC_*"]),
            framework("nextjs", Strategy::Some, &["next"], &["NEXT_PUBLIC_*"]),
            framework("gatsby", Strategy::Some, &["gatsby"], &["GATSBY_*"]),
            framework(
                "sveltekit",
                Strategy::Some,
                &["@sveltejs/kit"],
                &["VITE_*", "PUBLIC_*"],
            ),
            framework("astro", Strategy::Some, &["astro"], &["PUBLIC_*"]),
            framework(
                "solidstart",
                Strategy::All,
                &["solid-js", "solid-start"],
                &["VITE_*"],
            ),
            framework("vite", Strategy::Some, &["vite"], &["VITE_*"]),
            framework(
                "create-react-app",
                Strategy::Some,
                &["react-scripts"],
                &["REACT_APP_*"],
            ),
            framework(
                "vue-cli",
                Strategy::Some,
                &["@vue/cli-service"],
                &["VUE_APP_*"],
            ),
            framework(
                "nuxtjs",
                Strategy::Some,
                &["nuxt", "nuxt3", "nuxt-edge"],
                &["NUXT_ENV_*"],
            ),
            framework(
                "remix",
                Strategy::Some,
                &["@remix-run/dev"],
                &["REMIX_*"],
            ),
        ]
    })
}

/// Finds the first framework whose dependency matcher is satisfied by
/// `dependency_names`, the package's declared (unresolved) npm dependency
/// names.
pub fn infer_framework(dependency_names: &[String]) -> Option<&'static Framework> {
    frameworks()
        .iter()
        .find(|framework| framework.dependency_match.test(dependency_names))
}
