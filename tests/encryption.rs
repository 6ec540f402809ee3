mod common;

use craftpdf::{
    authenticate_bytes, decrypt_document, extract_text_from_page, DocConfig, Document,
    EncryptionMethod, Obj, ParsedPdf, PdfError, Permissions, Protection, SeededRng,
};
use pretty_assertions::assert_eq;

use common::ttf::minimal_ttf;

fn encrypted_doc(method: EncryptionMethod, user: &str, owner: &str) -> Vec<u8> {
    let mut doc = Document::new();
    doc.start(DocConfig {
        protection: Some(Protection {
            method,
            user_password: user.to_string(),
            owner_password: if owner.is_empty() {
                None
            } else {
                Some(owner.to_string())
            },
            permissions: Permissions::all(),
        }),
        ..DocConfig::default()
    });
    doc.set_rng(Box::new(SeededRng::new(7)));
    doc.add_page().unwrap();
    doc.add_ttf_font("Test", "", minimal_ttf()).unwrap();
    doc.set_font("Test", "", 12.0).unwrap();
    doc.set_xy(40.0, 40.0);
    doc.cell(None, "AB").unwrap();
    doc.line(10.0, 10.0, 100.0, 100.0).unwrap();
    doc.save().unwrap()
}

const ALL_METHODS: [EncryptionMethod; 4] = [
    EncryptionMethod::Rc4_40,
    EncryptionMethod::Rc4_128,
    EncryptionMethod::Aes128,
    EncryptionMethod::Aes256,
];

#[test]
fn trailer_references_encrypt_dict() {
    for method in ALL_METHODS {
        let bytes = encrypted_doc(method, "u", "o");
        let parsed = ParsedPdf::parse(&bytes).unwrap();
        assert!(parsed.trailer.get("Encrypt").is_some(), "{:?}", method);
        let enc = parsed.encrypt_dict().unwrap();
        assert_eq!(enc.get("Filter").and_then(Obj::as_name), Some("Standard"));
    }
}

#[test]
fn dictionary_layout_matches_method() {
    let cases = [
        (EncryptionMethod::Rc4_40, 1, 2, 40),
        (EncryptionMethod::Rc4_128, 2, 3, 128),
        (EncryptionMethod::Aes128, 4, 4, 128),
        (EncryptionMethod::Aes256, 5, 6, 256),
    ];
    for (method, v, r, len) in cases {
        let bytes = encrypted_doc(method, "u", "o");
        let parsed = ParsedPdf::parse(&bytes).unwrap();
        let enc = parsed.encrypt_dict().unwrap();
        assert_eq!(enc.get("V").and_then(Obj::as_int), Some(v), "{:?}", method);
        assert_eq!(enc.get("R").and_then(Obj::as_int), Some(r), "{:?}", method);
        assert_eq!(
            enc.get("Length").and_then(Obj::as_int),
            Some(len),
            "{:?}",
            method
        );
    }

    // AES dictionaries carry the crypt filter
    let bytes = encrypted_doc(EncryptionMethod::Aes128, "u", "o");
    let parsed = ParsedPdf::parse(&bytes).unwrap();
    let enc = parsed.encrypt_dict().unwrap();
    let std_cf = enc
        .get("CF")
        .and_then(Obj::as_dict)
        .and_then(|cf| cf.get("StdCF"))
        .and_then(Obj::as_dict)
        .unwrap();
    assert_eq!(std_cf.get("CFM").and_then(Obj::as_name), Some("AESV2"));
    assert_eq!(
        std_cf.get("AuthEvent").and_then(Obj::as_name),
        Some("DocOpen")
    );
    assert_eq!(enc.get("StmF").and_then(Obj::as_name), Some("StdCF"));

    let bytes = encrypted_doc(EncryptionMethod::Aes256, "u", "o");
    let parsed = ParsedPdf::parse(&bytes).unwrap();
    let enc = parsed.encrypt_dict().unwrap();
    let std_cf = enc
        .get("CF")
        .and_then(Obj::as_dict)
        .and_then(|cf| cf.get("StdCF"))
        .and_then(Obj::as_dict)
        .unwrap();
    assert_eq!(std_cf.get("CFM").and_then(Obj::as_name), Some("AESV3"));
    assert_eq!(enc.get("U").and_then(Obj::as_string).unwrap().len(), 48);
    assert_eq!(enc.get("O").and_then(Obj::as_string).unwrap().len(), 48);
    assert_eq!(enc.get("UE").and_then(Obj::as_string).unwrap().len(), 32);
    assert_eq!(enc.get("OE").and_then(Obj::as_string).unwrap().len(), 32);
    assert_eq!(enc.get("Perms").and_then(Obj::as_string).unwrap().len(), 16);
}

#[test]
fn both_passwords_authenticate() {
    for method in ALL_METHODS {
        let bytes = encrypted_doc(method, "user-pw", "owner-pw");

        let user_ctx = authenticate_bytes(&bytes, "user-pw")
            .unwrap_or_else(|e| panic!("user auth failed for {:?}: {}", method, e));
        assert!(!user_ctx.is_owner);

        let owner_ctx = authenticate_bytes(&bytes, "owner-pw")
            .unwrap_or_else(|e| panic!("owner auth failed for {:?}: {}", method, e));
        assert!(owner_ctx.is_owner);
        assert_eq!(user_ctx.file_key, owner_ctx.file_key);

        assert!(matches!(
            authenticate_bytes(&bytes, "wrong"),
            Err(PdfError::EncryptBadPassword)
        ));
    }
}

#[test]
fn aes256_file_key_is_32_bytes() {
    let bytes = encrypted_doc(EncryptionMethod::Aes256, "u", "o");
    let ctx = authenticate_bytes(&bytes, "u").unwrap();
    assert_eq!(ctx.method, EncryptionMethod::Aes256);
    assert_eq!(ctx.file_key.len(), 32);
}

#[test]
fn generated_owner_password_still_authenticates_user() {
    let bytes = encrypted_doc(EncryptionMethod::Rc4_128, "u", "");
    assert!(authenticate_bytes(&bytes, "u").is_ok());
    assert!(matches!(
        authenticate_bytes(&bytes, "not-it"),
        Err(PdfError::EncryptBadPassword)
    ));
}

#[test]
fn decrypt_restores_content_streams() {
    for method in ALL_METHODS {
        let bytes = encrypted_doc(method, "u", "o");

        // the stored content stream must not be readable as plaintext
        let parsed = ParsedPdf::parse(&bytes).unwrap();
        let pages = parsed.pages().unwrap();
        assert!(parsed.page_content(&pages[0]).is_err() || {
            let c = parsed.page_content(&pages[0]).unwrap_or_default();
            !String::from_utf8_lossy(&c).contains("Tj")
        });

        let ctx = authenticate_bytes(&bytes, "u").unwrap();
        let mut parsed = ParsedPdf::parse(&bytes).unwrap();
        decrypt_document(&mut parsed, &ctx).unwrap();
        let pages = parsed.pages().unwrap();
        let content =
            String::from_utf8(parsed.page_content(&pages[0]).unwrap()).unwrap();
        assert!(content.contains("<00010002> Tj"), "{:?}", method);
        assert!(content.contains(" l\nS\n"), "{:?}", method);
    }
}

#[test]
fn decrypted_file_extracts_text() {
    let bytes = encrypted_doc(EncryptionMethod::Aes256, "u", "o");
    let ctx = authenticate_bytes(&bytes, "u").unwrap();
    let mut parsed = ParsedPdf::parse(&bytes).unwrap();
    decrypt_document(&mut parsed, &ctx).unwrap();
    let plain = parsed.write();
    assert_eq!(extract_text_from_page(&plain, 0).unwrap(), "AB");
}

#[test]
fn missing_encrypt_dict_is_an_error() {
    let mut doc = Document::new();
    doc.start(DocConfig::default());
    doc.add_page().unwrap();
    let bytes = doc.save().unwrap();
    assert!(matches!(
        authenticate_bytes(&bytes, "any"),
        Err(PdfError::PdfParse(_))
    ));
}
