//! Classification of raw replies into typed results and problems.
//!
//! Every function here turns the raw outcome of exactly one request into exactly one of its
//! typed result or a [`Problem`] of the matching kind. Nothing in here fails any other way.

use crate::error::{BatchProblem, Code, OpKind, Problem};
use crate::proto::{Response, ZkError};
use crate::{Acl, Node, OpResult, Operation, Path, Stat};

fn unexpected() -> Code {
    Code::Unexpected(ZkError::MarshallingError as i32)
}

pub(crate) fn create(root: &Path, path: &Path, res: Result<Response, i32>) -> Result<Path, Problem> {
    match res {
        // the service reports the actual name, which includes any sequence suffix
        Ok(Response::String(actual)) => root
            .strip(&actual)
            .ok_or_else(|| OpKind::Create.problem(path.as_str(), Code::InvalidPath)),
        Ok(_) => Err(OpKind::Create.problem(path.as_str(), unexpected())),
        Err(code) => Err(OpKind::Create.problem(path.as_str(), Code::from_raw(code, None))),
    }
}

pub(crate) fn delete(
    path: &Path,
    version: Option<i32>,
    res: Result<Response, i32>,
) -> Result<(), Problem> {
    match res {
        Ok(Response::Empty) => Ok(()),
        Ok(_) => Err(OpKind::Delete.problem(path.as_str(), unexpected())),
        Err(code) => Err(OpKind::Delete.problem(path.as_str(), Code::from_raw(code, version))),
    }
}

pub(crate) fn set(
    path: &Path,
    version: Option<i32>,
    res: Result<Response, i32>,
) -> Result<Stat, Problem> {
    match res {
        Ok(Response::Stat(stat)) => Ok(stat),
        Ok(_) => Err(OpKind::Set.problem(path.as_str(), unexpected())),
        Err(code) => Err(OpKind::Set.problem(path.as_str(), Code::from_raw(code, version))),
    }
}

pub(crate) fn check(
    path: &Path,
    version: Option<i32>,
    res: Result<Response, i32>,
) -> Result<Stat, Problem> {
    match res {
        Ok(Response::Stat(stat)) => Ok(stat),
        Ok(_) => Err(OpKind::Check.problem(path.as_str(), unexpected())),
        Err(code) => Err(OpKind::Check.problem(path.as_str(), Code::from_raw(code, version))),
    }
}

pub(crate) fn get(path: &Path, res: Result<Response, i32>) -> Result<Node, Problem> {
    match res {
        Ok(Response::GetData { bytes, stat }) => Ok(Node {
            path: path.clone(),
            data: bytes,
            stat,
        }),
        Ok(_) => Err(OpKind::Get.problem(path.as_str(), unexpected())),
        Err(code) => Err(OpKind::Get.problem(path.as_str(), Code::from_raw(code, None))),
    }
}

pub(crate) fn exists(path: &Path, res: Result<Response, i32>) -> Result<Option<Stat>, Problem> {
    match res {
        Ok(Response::Stat(stat)) => Ok(Some(stat)),
        Ok(_) => Err(OpKind::Exists.problem(path.as_str(), unexpected())),
        Err(code) if code == ZkError::NoNode as i32 => Ok(None),
        Err(code) => Err(OpKind::Exists.problem(path.as_str(), Code::from_raw(code, None))),
    }
}

pub(crate) fn children(path: &Path, res: Result<Response, i32>) -> Result<Vec<String>, Problem> {
    match res {
        Ok(Response::Strings(children)) => Ok(children),
        Ok(_) => Err(OpKind::Children.problem(path.as_str(), unexpected())),
        Err(code) => Err(OpKind::Children.problem(path.as_str(), Code::from_raw(code, None))),
    }
}

pub(crate) fn get_acl(
    path: &Path,
    res: Result<Response, i32>,
) -> Result<(Vec<Acl>, Stat), Problem> {
    match res {
        Ok(Response::GetAcl { acl, stat }) => Ok((acl, stat)),
        Ok(_) => Err(OpKind::GetAcl.problem(path.as_str(), unexpected())),
        Err(code) => Err(OpKind::GetAcl.problem(path.as_str(), Code::from_raw(code, None))),
    }
}

pub(crate) fn set_acl(
    path: &Path,
    version: Option<i32>,
    res: Result<Response, i32>,
) -> Result<Stat, Problem> {
    match res {
        Ok(Response::Stat(stat)) => Ok(stat),
        Ok(_) => Err(OpKind::SetAcl.problem(path.as_str(), unexpected())),
        Err(code) => Err(OpKind::SetAcl.problem(path.as_str(), Code::from_raw(code, version))),
    }
}

pub(crate) fn auth(res: Result<Response, i32>) -> Result<(), Problem> {
    match res {
        Ok(Response::Empty) => Ok(()),
        Ok(_) => Err(Problem::Session { code: unexpected() }),
        Err(code) => Err(Problem::Session {
            code: Code::from_raw(code, None),
        }),
    }
}

/// The subset of an [`Operation`] that classifying its part of a transaction reply needs.
///
/// Submitting a transaction transfers ownership of the encoded operations to the dispatch flow,
/// so only the path and expected version of each operation are retained instead of cloning the
/// payloads.
#[derive(Debug)]
pub(crate) enum RequestMarker {
    Create { path: Path },
    Set { path: Path, version: Option<i32> },
    Delete { path: Path, version: Option<i32> },
    Check { path: Path, version: Option<i32> },
}

impl From<&Operation> for RequestMarker {
    fn from(op: &Operation) -> RequestMarker {
        let path = op.path().clone();
        match *op {
            Operation::Create { .. } => RequestMarker::Create { path },
            Operation::Set { version, .. } => RequestMarker::Set { path, version },
            Operation::Delete { version, .. } => RequestMarker::Delete { path, version },
            Operation::Check { version, .. } => RequestMarker::Check { path, version },
        }
    }
}

impl RequestMarker {
    /// Classify the outcome of the operation submitted on its own.
    pub(crate) fn classify(&self, root: &Path, res: Result<Response, i32>) -> Result<OpResult, Problem> {
        match *self {
            RequestMarker::Create { ref path } => {
                create(root, path, res).map(|path| OpResult::Create { path })
            }
            RequestMarker::Set { ref path, version } => {
                set(path, version, res).map(|stat| OpResult::Set {
                    path: path.clone(),
                    stat,
                })
            }
            RequestMarker::Delete { ref path, version } => {
                delete(path, version, res).map(|()| OpResult::Delete { path: path.clone() })
            }
            RequestMarker::Check { ref path, version } => {
                check(path, version, res).map(|stat| OpResult::Check {
                    path: path.clone(),
                    stat,
                })
            }
        }
    }

    fn problem(&self, code: Code) -> Problem {
        match *self {
            RequestMarker::Create { ref path } => OpKind::Create.problem(path.as_str(), code),
            RequestMarker::Set { ref path, .. } => OpKind::Set.problem(path.as_str(), code),
            RequestMarker::Delete { ref path, .. } => OpKind::Delete.problem(path.as_str(), code),
            RequestMarker::Check { ref path, .. } => OpKind::Check.problem(path.as_str(), code),
        }
    }

    fn version(&self) -> Option<i32> {
        match *self {
            RequestMarker::Create { .. } => None,
            RequestMarker::Set { version, .. }
            | RequestMarker::Delete { version, .. }
            | RequestMarker::Check { version, .. } => version,
        }
    }
}

/// Classify a transaction reply. `markers` must not be empty.
pub(crate) fn multi(
    root: &Path,
    markers: &[RequestMarker],
    res: Result<Response, i32>,
) -> Result<Vec<OpResult>, BatchProblem> {
    let whole = |code: Code| BatchProblem {
        index: 0,
        problem: markers[0].problem(code),
    };

    let responses = match res {
        Ok(Response::Multi(responses)) => responses,
        Ok(_) => return Err(whole(unexpected())),
        Err(code) => return Err(whole(Code::from_raw(code, markers[0].version()))),
    };
    if responses.len() != markers.len() {
        return Err(whole(unexpected()));
    }

    // operations before the failing one report Ok (rolled back), operations after it report
    // RuntimeInconsistency (skipped); the failing one carries the real reason
    for (index, (marker, response)) in markers.iter().zip(&responses).enumerate() {
        match *response {
            Err(ZkError::Ok) | Err(ZkError::RuntimeInconsistency) | Ok(_) => {}
            Err(e) => {
                return Err(BatchProblem {
                    index,
                    problem: marker.problem(Code::from_zk(e, marker.version())),
                })
            }
        }
    }

    markers
        .iter()
        .zip(responses)
        .enumerate()
        .map(|(index, (marker, response))| {
            let res = response.map_err(|e| e as i32);
            marker
                .classify(root, res)
                .map_err(|problem| BatchProblem { index, problem })
        })
        .collect()
}
