//! Argument vectors for the two-phase container workflow.

/// Inputs for `docker build`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerBuild {
    pub context: String,
    pub dockerfile: String,
    pub tag: String,
    pub build_args: Vec<(String, String)>,
    pub no_cache: bool,
}

impl DockerBuild {
    /// Environment for the build: the classic builder prints plain, complete logs.
    pub const ENV: [(&'static str, &'static str); 1] = [("DOCKER_BUILDKIT", "0")];

    pub fn argv(&self) -> Vec<String> {
        let mut argv = vec!["docker".to_string(), "build".to_string()];
        argv.push("-t".to_string());
        argv.push(self.tag.clone());
        if self.no_cache {
            argv.push("--no-cache".to_string());
        }
        if self.dockerfile != "Dockerfile" {
            argv.push("-f".to_string());
            argv.push(self.dockerfile.clone());
        }
        for (key, value) in &self.build_args {
            argv.push("--build-arg".to_string());
            argv.push(format!("{key}={value}"));
        }
        argv.push(self.context.clone());
        argv
    }
}

/// Inputs for `docker run --rm`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerRun {
    pub image: String,
    pub args: Vec<String>,
}

impl DockerRun {
    pub fn argv(&self) -> Vec<String> {
        let mut argv = vec!["docker".to_string(), "run".to_string(), "--rm".to_string()];
        argv.extend(self.args.iter().cloned());
        argv.push(self.image.clone());
        argv
    }
}

/// Parse `KEY=VALUE`.
pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {raw:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build() -> DockerBuild {
        DockerBuild {
            context: ".".to_string(),
            dockerfile: "Dockerfile".to_string(),
            tag: "fixer-app:latest".to_string(),
            build_args: Vec::new(),
            no_cache: false,
        }
    }

    #[test]
    fn default_build_is_minimal() {
        assert_eq!(
            build().argv(),
            ["docker", "build", "-t", "fixer-app:latest", "."]
        );
    }

    #[test]
    fn build_options_are_rendered_in_order() {
        let build = DockerBuild {
            dockerfile: "docker/Dockerfile.dev".to_string(),
            build_args: vec![("HTTP_PROXY".to_string(), "http://proxy:3128".to_string())],
            no_cache: true,
            ..build()
        };
        assert_eq!(
            build.argv(),
            [
                "docker",
                "build",
                "-t",
                "fixer-app:latest",
                "--no-cache",
                "-f",
                "docker/Dockerfile.dev",
                "--build-arg",
                "HTTP_PROXY=http://proxy:3128",
                ".",
            ]
        );
    }

    #[test]
    fn run_places_image_last() {
        let run = DockerRun {
            image: "fixer-app:latest".to_string(),
            args: vec!["-p".to_string(), "8080:80".to_string()],
        };
        assert_eq!(
            run.argv(),
            ["docker", "run", "--rm", "-p", "8080:80", "fixer-app:latest"]
        );
    }

    #[test]
    fn key_value_parsing() {
        assert_eq!(
            parse_key_value("A=b=c"),
            Ok(("A".to_string(), "b=c".to_string()))
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }
}
