// SPDX-License-Identifier: MIT

//! Profiles: EAT-identified bundles of extensions and choice variants.
//!
//! A [`ProfileManifest`] maps extension points to [`Extension`]s and lists
//! the choice variants the profile introduces. Manifests are kept in a
//! process-wide registry keyed by the profile identifier's string form; the
//! built-in PSA, CCA and TDX profiles are registered on first use.
//!
//! When a CoRIM (or Concise Evidence) naming a registered profile is
//! decoded, the profile's declared fields are bound to the entries sitting
//! in the document's extension maps. Documents naming an unregistered
//! profile still decode; their extension entries stay in the field-cache.

use std::{
    collections::{BTreeMap, HashMap},
    fmt::Display,
    str::FromStr,
    sync::{Arc, RwLock},
};

use ciborium::{tag::Required, Value};
use once_cell::sync::Lazy;
use serde::{de, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    cbor::{TAG_OID, TAG_URI},
    choice::{register_variant, ChoiceKind, Peeked, VariantSpec},
    Comid, ConciseEvidence, Error, Extension, ExtensionField, ExtensionMap, ExtensionPoint,
    ExtensionTarget, Mval, Oid, RegistrationError, Result, Signer, TaggedUri, Triples,
    UnsignedCorim, ValueTriple,
};

/// EAT profile identifier: a URI or an OID.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProfileId {
    Uri(TaggedUri),
    Oid(Oid),
}

impl ProfileId {
    pub fn uri<U: Into<String>>(uri: U) -> Self {
        Self::Uri(TaggedUri::new(uri))
    }

    pub fn oid(dotted: &str) -> Result<Self> {
        dotted.parse().map(Self::Oid)
    }

    pub fn valid(&self) -> Result<()> {
        match self {
            Self::Uri(uri) => uri.valid(),
            Self::Oid(oid) => oid.arcs().map(|_| ()),
        }
    }
}

impl Display for ProfileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uri(uri) => write!(f, "{uri}"),
            Self::Oid(oid) => write!(f, "{oid}"),
        }
    }
}

/// Dotted-decimal strings are OIDs, anything else a URI.
impl FromStr for ProfileId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let dotted = s.contains('.') && s.chars().all(|c| c.is_ascii_digit() || c == '.');
        if dotted {
            Self::oid(s)
        } else {
            Ok(Self::uri(s))
        }
    }
}

impl Serialize for ProfileId {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            _ if serializer.is_human_readable() => serializer.collect_str(self),
            Self::Uri(uri) => uri.serialize(serializer),
            Self::Oid(oid) => Required::<&Oid, TAG_OID>(oid).serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ProfileId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        match Peeked::deserialize(deserializer)? {
            Peeked::Json(serde_json::Value::String(s)) => s.parse().map_err(de::Error::custom),
            Peeked::Cbor(Value::Tag(TAG_URI, inner)) => match *inner {
                Value::Text(s) => Ok(Self::uri(s)),
                _ => Err(de::Error::custom("profile URI must be a text string")),
            },
            Peeked::Cbor(Value::Tag(TAG_OID, inner)) => match *inner {
                Value::Bytes(b) => Oid::from_ber(&b).map(Self::Oid).map_err(de::Error::custom),
                _ => Err(de::Error::custom("profile OID must be a byte string")),
            },
            _ => Err(de::Error::custom(
                "profile must be a tagged URI (32) or a tagged OID (111)",
            )),
        }
    }
}

/// Everything a profile contributes.
#[derive(Clone)]
pub struct ProfileManifest {
    pub id: ProfileId,
    extensions: BTreeMap<ExtensionPoint, Vec<Arc<dyn Extension>>>,
    variants: Vec<(ChoiceKind, VariantSpec)>,
}

impl std::fmt::Debug for ProfileManifest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileManifest")
            .field("id", &self.id)
            .field("points", &self.extensions.keys().collect::<Vec<_>>())
            .field("variants", &self.variants)
            .finish()
    }
}

impl ProfileManifest {
    pub fn new(id: ProfileId) -> Self {
        Self {
            id,
            extensions: BTreeMap::new(),
            variants: vec![],
        }
    }

    /// A manifest with a single extension, which has nothing to clash with.
    pub fn from_extension(id: ProfileId, point: ExtensionPoint, extension: Arc<dyn Extension>) -> Self {
        let mut manifest = Self::new(id);
        manifest.extensions.insert(point, vec![extension]);
        manifest
    }

    /// Adds an extension at `point`. Its fields must not reuse a key or
    /// name already declared at that point.
    pub fn with_extension(mut self, point: ExtensionPoint, extension: Arc<dyn Extension>) -> Result<Self> {
        let existing = self.extensions.entry(point).or_default();

        for field in extension.fields() {
            let clash = existing
                .iter()
                .flat_map(|e| e.fields())
                .any(|f| f.key == field.key || f.name == field.name);

            if clash {
                return Err(RegistrationError::DuplicateField {
                    point: point.to_string(),
                    key: field.key,
                    name: field.name.clone(),
                }
                .into());
            }
        }

        existing.push(extension);
        Ok(self)
    }

    /// As [`Self::with_extension`], with the point given by name.
    pub fn with_named_extension(self, point: &str, extension: Arc<dyn Extension>) -> Result<Self> {
        let point = point.parse()?;
        self.with_extension(point, extension)
    }

    pub fn with_variant(mut self, kind: ChoiceKind, spec: VariantSpec) -> Self {
        self.variants.push((kind, spec));
        self
    }

    pub fn variants(&self) -> &[(ChoiceKind, VariantSpec)] {
        &self.variants
    }

    pub fn extensions(&self, point: ExtensionPoint) -> &[Arc<dyn Extension>] {
        self.extensions.get(&point).map_or(&[], Vec::as_slice)
    }

    /// All fields declared at `point`.
    pub fn fields(&self, point: ExtensionPoint) -> Vec<ExtensionField> {
        self.extensions(point)
            .iter()
            .flat_map(|e| e.fields().iter().cloned())
            .collect()
    }

    /// Runs the constraints of every extension registered at the target's
    /// point.
    pub fn constrain(&self, target: &ExtensionTarget<'_>) -> Result<()> {
        self.extensions(target.point())
            .iter()
            .try_for_each(|e| e.constrain(target))
    }

    fn resolve(&self, extensions: &mut ExtensionMap, points: &[ExtensionPoint]) -> Result<()> {
        let fields: Vec<ExtensionField> = points.iter().flat_map(|p| self.fields(*p)).collect();
        if fields.is_empty() {
            return Ok(());
        }
        extensions.resolve(&fields)
    }

    /// Binds this profile's fields throughout a CoRIM.
    pub fn apply_to_corim(&self, corim: &mut UnsignedCorim) -> Result<()> {
        self.resolve(&mut corim.extensions, &[ExtensionPoint::UnsignedCorim])?;

        for entity in &mut corim.entities {
            self.resolve(&mut entity.extensions, &[ExtensionPoint::CorimEntity])?;
        }

        for comid in corim.comids_mut() {
            self.apply_to_comid(comid)?;
        }

        Ok(())
    }

    pub fn apply_to_signer(&self, signer: &mut Signer) -> Result<()> {
        self.resolve(&mut signer.extensions, &[ExtensionPoint::Signer])
    }

    pub fn apply_to_comid(&self, comid: &mut Comid) -> Result<()> {
        self.resolve(&mut comid.extensions, &[ExtensionPoint::Comid])?;

        for entity in &mut comid.entities {
            self.resolve(&mut entity.extensions, &[ExtensionPoint::ComidEntity])?;
        }

        self.apply_to_triples(&mut comid.triples)
    }

    fn apply_to_triples(&self, triples: &mut Triples) -> Result<()> {
        self.resolve(&mut triples.extensions, &[ExtensionPoint::Triples])?;

        for triple in &mut triples.reference_values {
            self.apply_to_value_triple(
                triple,
                ExtensionPoint::ReferenceValue,
                ExtensionPoint::ReferenceValueFlags,
            )?;
        }

        for triple in &mut triples.endorsed_values {
            self.apply_to_value_triple(
                triple,
                ExtensionPoint::EndorsedValue,
                ExtensionPoint::EndorsedValueFlags,
            )?;
        }

        Ok(())
    }

    fn apply_to_value_triple(
        &self,
        triple: &mut ValueTriple,
        point: ExtensionPoint,
        flags_point: ExtensionPoint,
    ) -> Result<()> {
        for measurement in &mut triple.measurements {
            self.apply_to_mval(&mut measurement.value, &[point, ExtensionPoint::Mval])?;

            if let Some(flags) = &mut measurement.value.flags {
                self.resolve(&mut flags.extensions, &[flags_point])?;
            }
        }
        Ok(())
    }

    fn apply_to_mval(&self, mval: &mut Mval, points: &[ExtensionPoint]) -> Result<()> {
        self.resolve(&mut mval.extensions, points)
    }

    pub fn apply_to_evidence(&self, evidence: &mut ConciseEvidence) -> Result<()> {
        let triples = &mut evidence.triples;
        self.resolve(&mut triples.extensions, &[ExtensionPoint::EvidenceTriples])?;

        for triple in &mut triples.evidence_triples {
            for measurement in &mut triple.measurements {
                self.apply_to_mval(&mut measurement.value, &[ExtensionPoint::Mval])?;
            }
        }

        Ok(())
    }
}

static PROFILES: Lazy<RwLock<HashMap<String, Arc<ProfileManifest>>>> = Lazy::new(|| {
    let profiles = crate::profiles::builtin_profiles()
        .into_iter()
        .map(|p| (p.id.to_string(), Arc::new(p)))
        .collect();
    RwLock::new(profiles)
});

/// Registers a profile and the choice variants it introduces.
pub fn register_profile(manifest: ProfileManifest) -> Result<()> {
    let key = manifest.id.to_string();
    let mut profiles = PROFILES
        .write()
        .map_err(|_| Error::marshal("profile registry lock poisoned"))?;

    if profiles.contains_key(&key) {
        return Err(RegistrationError::DuplicateProfile(key).into());
    }

    for (kind, spec) in &manifest.variants {
        register_variant(*kind, spec.clone())?;
    }

    debug!(profile = %key, "registered profile");
    profiles.insert(key, Arc::new(manifest));
    Ok(())
}

/// Removes a profile. Its choice variants stay registered.
pub fn unregister_profile(id: &ProfileId) -> bool {
    let Ok(mut profiles) = PROFILES.write() else {
        return false;
    };

    let removed = profiles.remove(&id.to_string()).is_some();
    if removed {
        debug!(profile = %id, "unregistered profile");
    }
    removed
}

pub fn get_profile_manifest(id: &ProfileId) -> Option<Arc<ProfileManifest>> {
    PROFILES.read().ok()?.get(&id.to_string()).cloned()
}

/// Looks up the profile a decoded document names, warning when nothing is
/// registered under it.
pub(crate) fn lookup_for_decode(id: Option<&ProfileId>) -> Option<Arc<ProfileManifest>> {
    let id = id?;
    match get_profile_manifest(id) {
        Some(manifest) => {
            debug!(profile = %id, "applying profile");
            Some(manifest)
        }
        None => {
            warn!(profile = %id, "profile not registered, extensions left unresolved");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cbor, FieldExtension, FieldKind};
    use hex_literal::hex;

    fn field_ext(key: i64, name: &str) -> Arc<dyn Extension> {
        Arc::new(FieldExtension::new(vec![ExtensionField::new(
            key,
            name,
            FieldKind::text(),
        )]))
    }

    #[test]
    fn test_profile_id_forms() {
        let uri = ProfileId::uri("http://example.com/p");
        assert_eq!(cbor::to_json(&uri).unwrap(), r#""http://example.com/p""#);
        assert_eq!(
            cbor::to_vec(&uri).unwrap(),
            hex!("d8 20 74 68 74 74 70 3a 2f 2f 65 78 61 6d 70 6c 65 2e 63 6f 6d 2f 70")
        );

        let oid: ProfileId = "2.16.840.1.113741.1.16.1".parse().unwrap();
        assert!(matches!(oid, ProfileId::Oid(_)));
        let bytes = cbor::to_vec(&oid).unwrap();
        assert_eq!(bytes, hex!("d8 6f 4a 60 86 48 01 86 f8 4d 01 10 01"));
        assert_eq!(cbor::from_slice::<ProfileId>(&bytes).unwrap(), oid);
        assert_eq!(
            cbor::from_json::<ProfileId>(r#""2.16.840.1.113741.1.16.1""#).unwrap(),
            oid
        );
    }

    #[test]
    fn test_every_builtin_profile_is_built() {
        let builtins = crate::profiles::builtin_profiles();
        assert_eq!(builtins.len(), 4);
        for manifest in &builtins {
            let declares = [ExtensionPoint::Triples, ExtensionPoint::Mval]
                .into_iter()
                .any(|point| !manifest.extensions(point).is_empty());
            assert!(declares, "{} declares no extension", manifest.id);
        }
    }

    #[test]
    fn test_builtin_profiles_are_registered() {
        for id in [
            "tag:arm.com,2025:psa#1.0.0",
            "tag:arm.com,2025:cca_platform#1.0.0",
            "tag:arm.com,2025:cca_realm#1.0.0",
            "2.16.840.1.113741.1.16.1",
        ] {
            let id: ProfileId = id.parse().unwrap();
            assert!(get_profile_manifest(&id).is_some(), "{id} missing");
        }
    }

    #[test]
    fn test_register_and_unregister() {
        let id = ProfileId::uri("http://example.com/test-register");
        let manifest = ProfileManifest::new(id.clone())
            .with_extension(ExtensionPoint::UnsignedCorim, field_ext(-1, "Extension1"))
            .unwrap();

        register_profile(manifest.clone()).unwrap();
        assert_eq!(
            register_profile(manifest).unwrap_err(),
            Error::Registration(RegistrationError::DuplicateProfile(id.to_string()))
        );

        let found = get_profile_manifest(&id).unwrap();
        assert_eq!(found.fields(ExtensionPoint::UnsignedCorim)[0].name, "Extension1");

        assert!(unregister_profile(&id));
        assert!(!unregister_profile(&id));
        assert!(get_profile_manifest(&id).is_none());
    }

    #[test]
    fn test_unknown_extension_point() {
        let err = ProfileManifest::new(ProfileId::uri("http://example.com/x"))
            .with_named_extension("Nowhere", field_ext(-1, "a"))
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown extension point \"Nowhere\"");
    }

    #[test]
    fn test_duplicate_field_at_point() {
        let err = ProfileManifest::new(ProfileId::uri("http://example.com/x"))
            .with_extension(ExtensionPoint::Mval, field_ext(-1, "a"))
            .unwrap()
            .with_extension(ExtensionPoint::Mval, field_ext(-1, "b"))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Registration(RegistrationError::DuplicateField { key: -1, .. })
        ));
    }
}
